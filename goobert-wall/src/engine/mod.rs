//! Media engine abstraction
//!
//! One `MediaEngine` session drives one grid cell. Commands are
//! fire-and-forget: the engine reports the resulting state through
//! `EngineEvent`s, which the wall loop pulls with `poll_event()` after the
//! engine has signalled its `EngineWaker`.
//!
//! **Threading:** engines may invoke the waker from any thread, but every
//! trait method is only ever called from the wall loop task.

pub mod simulated;

pub use simulated::{SimulatedEngine, SimulatedEngineFactory};

use crate::bridge::EngineWaker;
use crate::error::Result;
use goobert_common::CellId;

/// State change reported by an engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Current file changed; `None` when the engine stopped or emptied
    FileChanged(Option<String>),
    /// Playback position in seconds
    PositionChanged(f64),
    /// Duration of the current file in seconds
    DurationChanged(f64),
    PauseChanged(bool),
    LoopChanged(bool),
    /// File finished loading and is ready to seek
    FileLoaded(String),
}

/// Per-cell playback session
pub trait MediaEngine: Send {
    /// Install the waker; called once right after creation
    fn set_waker(&mut self, waker: EngineWaker);

    /// Next pending event, oldest first
    fn poll_event(&mut self) -> Option<EngineEvent>;

    /// Replace the playlist and start at its first entry
    fn load_playlist(&mut self, files: &[String]);

    /// Replace the playlist with a single file
    fn load_file(&mut self, path: &str);

    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn toggle_pause(&mut self);

    fn next(&mut self);
    fn prev(&mut self);
    fn shuffle(&mut self);
    fn play_index(&mut self, index: usize);

    fn seek_relative(&mut self, seconds: f64);
    fn seek_absolute(&mut self, seconds: f64);
    fn frame_step(&mut self);
    fn frame_back_step(&mut self);

    /// Volume 0-100
    fn set_volume(&mut self, volume: u8);
    fn toggle_mute(&mut self);
    fn mute(&mut self);
    fn unmute(&mut self);

    /// Loop the current file
    fn set_loop(&mut self, enabled: bool);

    /// Rotate by 90 degrees
    fn rotate(&mut self);
    /// Zoom in log2 steps around the center
    fn zoom_by(&mut self, delta: f64);
    /// Zoom towards a normalized point (0.0-1.0 on both axes)
    fn zoom_at(&mut self, delta: f64, x: f64, y: f64);
    fn reset_zoom(&mut self);

    fn screenshot(&mut self);

    /// On-screen controls, enabled while a cell is tile fullscreen
    fn set_overlay_enabled(&mut self, enabled: bool);

    /// Rewrite playlist entries after a file rename
    fn update_playlist_path(&mut self, old_path: &str, new_path: &str);
}

/// Creates one engine session per cell
pub trait EngineFactory: Send {
    fn create(&mut self, cell: CellId) -> Result<Box<dyn MediaEngine>>;
}
