//! In-process simulated media engine
//!
//! Behaves like a playlist player with `loop-playlist` semantics: `next`
//! past the end wraps to the first entry, `prev` before the start wraps to
//! the last. Every command produces the same events a real engine would
//! report, and an optional background clock advances playback from a
//! separate OS thread so the foreign-thread wakeup path gets exercised.
//!
//! Tests keep a clone of the factory and inspect engines through
//! `SimulatedHandle`s.

use super::{EngineEvent, EngineFactory, MediaEngine};
use crate::bridge::EngineWaker;
use crate::error::{Error, Result};
use goobert_common::CellId;
use rand::seq::SliceRandom;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Seconds moved by one frame step
const FRAME_SECONDS: f64 = 1.0 / 30.0;

/// Zoom range accepted by `zoom_at` (log2 scale)
const ZOOM_MIN: f64 = -1.0;
const ZOOM_MAX: f64 = 3.0;

/// Observable engine state (test inspection)
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedSnapshot {
    pub playlist: Vec<String>,
    pub index: Option<usize>,
    pub current_file: Option<String>,
    pub position: f64,
    pub duration: f64,
    pub paused: bool,
    pub looping: bool,
    pub muted: bool,
    pub volume: u8,
    pub overlay_enabled: bool,
    pub rotation: u32,
    pub zoom: f64,
    pub pan: (f64, f64),
    pub screenshots: u32,
    /// Names of every command received, in order
    pub commands: Vec<&'static str>,
    pub closed: bool,
}

struct SimState {
    view: SimulatedSnapshot,
    events: VecDeque<EngineEvent>,
    waker: Option<EngineWaker>,
    durations: HashMap<String, f64>,
    default_duration: f64,
}

impl SimState {
    fn push(&mut self, event: EngineEvent) {
        self.events.push_back(event);
    }

    fn duration_of(&self, path: &str) -> f64 {
        self.durations
            .get(path)
            .copied()
            .unwrap_or(self.default_duration)
    }

    fn switch_to(&mut self, index: usize) {
        let Some(path) = self.view.playlist.get(index).cloned() else {
            return;
        };
        let duration = self.duration_of(&path);
        self.view.index = Some(index);
        self.view.current_file = Some(path.clone());
        self.view.position = 0.0;
        self.view.duration = duration;
        self.push(EngineEvent::FileChanged(Some(path.clone())));
        self.push(EngineEvent::DurationChanged(duration));
        self.push(EngineEvent::FileLoaded(path));
        self.push(EngineEvent::PositionChanged(0.0));
    }

    fn go_idle(&mut self) {
        let had_file = self.view.current_file.take().is_some();
        self.view.index = None;
        self.view.position = 0.0;
        self.view.duration = 0.0;
        if had_file {
            self.push(EngineEvent::FileChanged(None));
        }
    }

    fn set_paused(&mut self, paused: bool) {
        if self.view.paused != paused {
            self.view.paused = paused;
            self.push(EngineEvent::PauseChanged(paused));
        }
    }

    fn set_position(&mut self, seconds: f64) {
        let upper = if self.view.duration > 0.0 {
            self.view.duration
        } else {
            f64::MAX
        };
        self.view.position = seconds.clamp(0.0, upper);
        self.push(EngineEvent::PositionChanged(self.view.position));
    }

    fn step(&mut self, forward: bool) {
        let len = self.view.playlist.len();
        if len == 0 {
            return;
        }
        let next = match (self.view.index, forward) {
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
            (None, _) => 0,
        };
        self.switch_to(next);
    }

    /// Advance the playback clock
    fn advance(&mut self, seconds: f64) {
        if self.view.paused || self.view.current_file.is_none() || self.view.closed {
            return;
        }
        let target = self.view.position + seconds;
        if self.view.duration > 0.0 && target >= self.view.duration {
            if self.view.looping {
                self.set_position(0.0);
            } else {
                self.step(true);
            }
        } else {
            self.view.position = target;
            self.push(EngineEvent::PositionChanged(target));
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Inspection and fault-injection handle for one simulated engine
#[derive(Clone)]
pub struct SimulatedHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedHandle {
    fn update(&self, f: impl FnOnce(&mut SimState)) {
        let waker = {
            let mut st = lock(&self.state);
            let before = st.events.len();
            f(&mut st);
            if st.events.len() > before {
                st.waker.clone()
            } else {
                None
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub fn snapshot(&self) -> SimulatedSnapshot {
        lock(&self.state).view.clone()
    }

    /// Drop the current file as if playback failed
    pub fn go_idle(&self) {
        self.update(|st| st.go_idle());
    }

    /// Advance playback by `seconds` (ignored while paused or idle)
    pub fn advance(&self, seconds: f64) {
        self.update(|st| st.advance(seconds));
    }

    /// Inject an arbitrary engine event
    pub fn emit(&self, event: EngineEvent) {
        self.update(|st| st.push(event));
    }

    /// Events not yet pulled by the wall
    pub fn pending_events(&self) -> usize {
        lock(&self.state).events.len()
    }
}

/// Simulated engine session for one cell
pub struct SimulatedEngine {
    cell: CellId,
    handle: SimulatedHandle,
    live: Arc<AtomicUsize>,
}

impl SimulatedEngine {
    pub fn handle(&self) -> SimulatedHandle {
        self.handle.clone()
    }

    fn command(&self, name: &'static str, f: impl FnOnce(&mut SimState)) {
        self.handle.update(|st| {
            st.view.commands.push(name);
            f(st);
        });
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        lock(&self.handle.state).view.closed = true;
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!(cell = %self.cell, "Simulated engine released");
    }
}

impl MediaEngine for SimulatedEngine {
    fn set_waker(&mut self, waker: EngineWaker) {
        lock(&self.handle.state).waker = Some(waker);
    }

    fn poll_event(&mut self) -> Option<EngineEvent> {
        lock(&self.handle.state).events.pop_front()
    }

    fn load_playlist(&mut self, files: &[String]) {
        if files.is_empty() {
            return;
        }
        let files = files.to_vec();
        self.command("load_playlist", move |st| {
            st.view.playlist = files;
            st.switch_to(0);
        });
    }

    fn load_file(&mut self, path: &str) {
        let path = path.to_string();
        self.command("load_file", move |st| {
            st.view.playlist = vec![path];
            st.switch_to(0);
        });
    }

    fn play(&mut self) {
        self.command("play", |st| st.set_paused(false));
    }

    fn pause(&mut self) {
        self.command("pause", |st| st.set_paused(true));
    }

    fn stop(&mut self) {
        self.command("stop", |st| {
            st.view.playlist.clear();
            st.go_idle();
        });
    }

    fn toggle_pause(&mut self) {
        self.command("toggle_pause", |st| {
            let paused = !st.view.paused;
            st.set_paused(paused);
        });
    }

    fn next(&mut self) {
        self.command("next", |st| st.step(true));
    }

    fn prev(&mut self) {
        self.command("prev", |st| st.step(false));
    }

    fn shuffle(&mut self) {
        self.command("shuffle", |st| {
            let current = st.view.index.and_then(|i| st.view.playlist.get(i).cloned());
            st.view.playlist.shuffle(&mut rand::thread_rng());
            if let Some(current) = current {
                st.view.index = st.view.playlist.iter().position(|p| *p == current);
            }
        });
    }

    fn play_index(&mut self, index: usize) {
        self.command("play_index", move |st| st.switch_to(index));
    }

    fn seek_relative(&mut self, seconds: f64) {
        self.command("seek_relative", move |st| {
            if st.view.current_file.is_some() {
                let target = st.view.position + seconds;
                st.set_position(target);
            }
        });
    }

    fn seek_absolute(&mut self, seconds: f64) {
        self.command("seek_absolute", move |st| {
            if st.view.current_file.is_some() {
                st.set_position(seconds);
            }
        });
    }

    fn frame_step(&mut self) {
        self.command("frame_step", |st| {
            if st.view.current_file.is_some() {
                st.set_paused(true);
                let target = st.view.position + FRAME_SECONDS;
                st.set_position(target);
            }
        });
    }

    fn frame_back_step(&mut self) {
        self.command("frame_back_step", |st| {
            if st.view.current_file.is_some() {
                st.set_paused(true);
                let target = st.view.position - FRAME_SECONDS;
                st.set_position(target);
            }
        });
    }

    fn set_volume(&mut self, volume: u8) {
        self.command("set_volume", move |st| st.view.volume = volume.min(100));
    }

    fn toggle_mute(&mut self) {
        self.command("toggle_mute", |st| st.view.muted = !st.view.muted);
    }

    fn mute(&mut self) {
        self.command("mute", |st| st.view.muted = true);
    }

    fn unmute(&mut self) {
        self.command("unmute", |st| st.view.muted = false);
    }

    fn set_loop(&mut self, enabled: bool) {
        self.command("set_loop", move |st| {
            st.view.looping = enabled;
            st.push(EngineEvent::LoopChanged(enabled));
        });
    }

    fn rotate(&mut self) {
        self.command("rotate", |st| st.view.rotation = (st.view.rotation + 90) % 360);
    }

    fn zoom_by(&mut self, delta: f64) {
        self.command("zoom_by", move |st| st.view.zoom += delta);
    }

    fn zoom_at(&mut self, delta: f64, x: f64, y: f64) {
        self.command("zoom_at", move |st| {
            let new_zoom = st.view.zoom + delta;
            if !(ZOOM_MIN..=ZOOM_MAX).contains(&new_zoom) {
                return;
            }
            // Keep the point under the cursor fixed while scaling
            let ratio = 2f64.powf(new_zoom) / 2f64.powf(st.view.zoom);
            let (cx, cy) = (x - 0.5, y - 0.5);
            let (pan_x, pan_y) = st.view.pan;
            st.view.pan = (
                pan_x * ratio - cx * (ratio - 1.0),
                pan_y * ratio - cy * (ratio - 1.0),
            );
            st.view.zoom = new_zoom;
        });
    }

    fn reset_zoom(&mut self) {
        self.command("reset_zoom", |st| {
            st.view.zoom = 0.0;
            st.view.pan = (0.0, 0.0);
        });
    }

    fn screenshot(&mut self) {
        self.command("screenshot", |st| st.view.screenshots += 1);
    }

    fn set_overlay_enabled(&mut self, enabled: bool) {
        self.command("set_overlay_enabled", move |st| st.view.overlay_enabled = enabled);
    }

    fn update_playlist_path(&mut self, old_path: &str, new_path: &str) {
        let (old_path, new_path) = (old_path.to_string(), new_path.to_string());
        self.command("update_playlist_path", move |st| {
            for entry in st.view.playlist.iter_mut().filter(|p| **p == old_path) {
                *entry = new_path.clone();
            }
            if st.view.current_file.as_deref() == Some(old_path.as_str()) {
                st.view.current_file = Some(new_path);
            }
        });
    }
}

struct FactoryShared {
    live: Arc<AtomicUsize>,
    created: AtomicUsize,
    handles: Mutex<HashMap<CellId, SimulatedHandle>>,
}

/// Factory producing `SimulatedEngine`s
///
/// Clones share live-session accounting and the handle registry.
#[derive(Clone)]
pub struct SimulatedEngineFactory {
    default_duration: f64,
    durations: HashMap<String, f64>,
    clock_tick: Option<Duration>,
    fail_after: Option<usize>,
    shared: Arc<FactoryShared>,
}

impl SimulatedEngineFactory {
    pub fn new() -> Self {
        Self {
            default_duration: 60.0,
            durations: HashMap::new(),
            clock_tick: None,
            fail_after: None,
            shared: Arc::new(FactoryShared {
                live: Arc::new(AtomicUsize::new(0)),
                created: AtomicUsize::new(0),
                handles: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Duration reported for files without an explicit duration
    pub fn with_default_duration(mut self, seconds: f64) -> Self {
        self.default_duration = seconds;
        self
    }

    pub fn with_duration(mut self, path: impl Into<String>, seconds: f64) -> Self {
        self.durations.insert(path.into(), seconds);
        self
    }

    /// Advance every engine from a background thread every `tick`
    pub fn with_clock(mut self, tick: Duration) -> Self {
        self.clock_tick = Some(tick);
        self
    }

    /// Fail creation once `count` engines have been created
    pub fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Engine sessions currently alive
    pub fn live_sessions(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Engine sessions created since the factory was built
    pub fn created_total(&self) -> usize {
        self.shared.created.load(Ordering::Acquire)
    }

    /// Handle to the most recent engine created for `cell`
    pub fn handle(&self, cell: CellId) -> Option<SimulatedHandle> {
        self.shared
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&cell)
            .cloned()
    }

    fn spawn_clock(cell: CellId, tick: Duration, state: Arc<Mutex<SimState>>) -> Result<()> {
        let handle = SimulatedHandle { state };
        std::thread::Builder::new()
            .name(format!("sim-clock-{}-{}", cell.row, cell.col))
            .spawn(move || loop {
                std::thread::sleep(tick);
                if lock(&handle.state).view.closed {
                    break;
                }
                handle.advance(tick.as_secs_f64());
            })
            .map_err(|e| Error::Engine(format!("Failed to start clock for {}: {}", cell, e)))?;
        Ok(())
    }
}

impl Default for SimulatedEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for SimulatedEngineFactory {
    fn create(&mut self, cell: CellId) -> Result<Box<dyn MediaEngine>> {
        let created = self.shared.created.load(Ordering::Acquire);
        if self.fail_after.is_some_and(|limit| created >= limit) {
            return Err(Error::Engine(format!("Simulated engine creation failed for {}", cell)));
        }

        let state = Arc::new(Mutex::new(SimState {
            view: SimulatedSnapshot {
                playlist: Vec::new(),
                index: None,
                current_file: None,
                position: 0.0,
                duration: 0.0,
                paused: false,
                looping: false,
                muted: false,
                volume: 100,
                overlay_enabled: false,
                rotation: 0,
                zoom: 0.0,
                pan: (0.0, 0.0),
                screenshots: 0,
                commands: Vec::new(),
                closed: false,
            },
            events: VecDeque::new(),
            waker: None,
            durations: self.durations.clone(),
            default_duration: self.default_duration,
        }));

        if let Some(tick) = self.clock_tick {
            Self::spawn_clock(cell, tick, Arc::clone(&state))?;
        }

        let handle = SimulatedHandle { state };
        self.shared
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(cell, handle.clone());
        self.shared.created.fetch_add(1, Ordering::AcqRel);
        self.shared.live.fetch_add(1, Ordering::AcqRel);

        Ok(Box::new(SimulatedEngine {
            cell,
            handle,
            live: Arc::clone(&self.shared.live),
        }))
    }
}
