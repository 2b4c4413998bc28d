//! Playback cell
//!
//! A `PlaybackCell` owns one grid position's engine session and the state
//! mirrored from that engine's events. Mirrored fields change only when an
//! engine event is applied; layout and audio flags change only through the
//! orchestrator's commands.

use crate::engine::{EngineEvent, MediaEngine};
use goobert_common::CellId;
use std::collections::HashSet;
use tokio::time::Instant;

/// Minimum position movement between two reported progress updates
const PROGRESS_STEP_SECONDS: f64 = 0.25;

/// Grid placement of a cell (top-left corner plus span)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

impl Placement {
    pub fn single(id: CellId) -> Self {
        Self {
            row: id.row,
            col: id.col,
            row_span: 1,
            col_span: 1,
        }
    }
}

/// Engine-reported state of a cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellState {
    pub current_file: Option<String>,
    pub position: f64,
    pub duration: f64,
    pub paused: bool,
    pub looping: bool,
    pub selected: bool,
}

/// Read-only copy of a cell for observers
#[derive(Debug, Clone, PartialEq)]
pub struct CellSnapshot {
    pub id: CellId,
    pub state: CellState,
    pub playlist_len: usize,
    pub placement: Placement,
    pub hidden: bool,
    pub muted: bool,
    pub overlay_enabled: bool,
}

pub struct PlaybackCell {
    id: CellId,
    engine: Box<dyn MediaEngine>,
    state: CellState,
    playlist: Vec<String>,
    placement: Placement,
    hidden: bool,
    muted: bool,
    overlay_enabled: bool,
    /// Set while the cell has no current file
    idle_since: Option<Instant>,
    seen_files: HashSet<String>,
    last_reported_position: Option<f64>,
}

impl PlaybackCell {
    /// A new cell starts idle as of `now`
    pub fn new(id: CellId, engine: Box<dyn MediaEngine>, now: Instant) -> Self {
        Self {
            id,
            engine,
            state: CellState::default(),
            playlist: Vec::new(),
            placement: Placement::single(id),
            hidden: false,
            muted: false,
            overlay_enabled: false,
            idle_since: Some(now),
            seen_files: HashSet::new(),
            last_reported_position: None,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn state(&self) -> &CellState {
        &self.state
    }

    pub fn engine_mut(&mut self) -> &mut dyn MediaEngine {
        self.engine.as_mut()
    }

    pub fn playlist(&self) -> &[String] {
        &self.playlist
    }

    /// Store `files` and hand them to the engine
    pub fn load_playlist(&mut self, files: Vec<String>) {
        self.engine.load_playlist(&files);
        self.playlist = files;
    }

    /// Rewrite stored and engine playlists after a rename
    ///
    /// Returns true if the current file was the renamed one.
    pub fn rename_path(&mut self, old_path: &str, new_path: &str) -> bool {
        for entry in self.playlist.iter_mut().filter(|p| *p == old_path) {
            *entry = new_path.to_string();
        }
        self.engine.update_playlist_path(old_path, new_path);
        if self.seen_files.remove(old_path) {
            self.seen_files.insert(new_path.to_string());
        }
        if self.state.current_file.as_deref() == Some(old_path) {
            self.state.current_file = Some(new_path.to_string());
            true
        } else {
            false
        }
    }

    /// Apply one engine event to the mirrored state
    pub fn apply_event(&mut self, event: &EngineEvent, now: Instant) {
        match event {
            EngineEvent::FileChanged(Some(path)) => {
                self.state.current_file = Some(path.clone());
                self.state.position = 0.0;
                self.state.duration = 0.0;
                self.idle_since = None;
                self.last_reported_position = None;
            }
            EngineEvent::FileChanged(None) => {
                self.state.current_file = None;
                self.state.position = 0.0;
                self.state.duration = 0.0;
                self.idle_since.get_or_insert(now);
            }
            EngineEvent::PositionChanged(position) => self.state.position = *position,
            EngineEvent::DurationChanged(duration) => self.state.duration = *duration,
            EngineEvent::PauseChanged(paused) => self.state.paused = *paused,
            EngineEvent::LoopChanged(looping) => self.state.looping = *looping,
            EngineEvent::FileLoaded(_) => {}
        }
    }

    /// True if a progress update for `position` should be reported
    pub fn take_progress_report(&mut self, position: f64) -> bool {
        let due = match self.last_reported_position {
            None => true,
            Some(last) => (position - last).abs() >= PROGRESS_STEP_SECONDS,
        };
        if due {
            self.last_reported_position = Some(position);
        }
        due
    }

    /// Record a file as seen by the intro skipper; true if it was new
    pub fn mark_seen(&mut self, path: &str) -> bool {
        self.seen_files.insert(path.to_string())
    }

    /// How long the cell has been without a file, if it is idle
    pub fn idle_for(&self, now: Instant) -> Option<std::time::Duration> {
        self.idle_since.map(|since| now.saturating_duration_since(since))
    }

    /// Restart the idle timer (after a watchdog restart)
    pub fn reset_idle(&mut self, now: Instant) {
        if self.idle_since.is_some() {
            self.idle_since = Some(now);
        }
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.state.selected = selected;
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
    }

    /// Back to the cell's own grid slot
    pub fn restore_placement(&mut self) {
        self.placement = Placement::single(self.id);
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn mute(&mut self) {
        self.engine.mute();
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        self.engine.unmute();
        self.muted = false;
    }

    pub fn toggle_mute(&mut self) {
        self.engine.toggle_mute();
        self.muted = !self.muted;
    }

    pub fn overlay_enabled(&self) -> bool {
        self.overlay_enabled
    }

    pub fn set_overlay_enabled(&mut self, enabled: bool) {
        self.engine.set_overlay_enabled(enabled);
        self.overlay_enabled = enabled;
    }

    pub fn snapshot(&self) -> CellSnapshot {
        CellSnapshot {
            id: self.id,
            state: self.state.clone(),
            playlist_len: self.playlist.len(),
            placement: self.placement,
            hidden: self.hidden,
            muted: self.muted,
            overlay_enabled: self.overlay_enabled,
        }
    }
}
