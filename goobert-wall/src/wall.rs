//! Wall orchestrator
//!
//! `Wall` owns every piece of orchestrator state: the cell registry, the
//! command router, the fullscreen controller, the watchdog, the session
//! accountant and the deferred-task queue. It is driven by exactly one task
//! (see `runtime`), so none of its methods block or await. Blocking work
//! (scans, renames) happens elsewhere and is handed in as plain results.
//!
//! Engine events are applied to the cell first and to the accountant second,
//! in the order each engine produced them.

use crate::accounting::{AccountingConfig, SessionAccountant, SinkHandle, SinkOp};
use crate::action::Action;
use crate::bridge::EngineEventBridge;
use crate::cell::{CellSnapshot, PlaybackCell};
use crate::engine::{EngineEvent, EngineFactory};
use crate::error::{Error, Result};
use crate::fullscreen::FullscreenController;
use crate::registry::CellRegistry;
use crate::router::{step_unless_looping, CommandRouter, RouteOutcome, WallRequest};
use crate::scheduler::{DeferredQueue, DeferredTask};
use crate::watchdog::Watchdog;
use chrono::Utc;
use goobert_common::config::SkipperConfig;
use goobert_common::db::{GridEventKind, GridEventRecord};
use goobert_common::events::NoticeLevel;
use goobert_common::paths::{is_image_path, normalize_path};
use goobert_common::{CellId, EventBus, FullscreenMode, WallConfig, WallEvent};
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Parameters of one grid run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRequest {
    pub rows: usize,
    pub cols: usize,
    pub source: PathBuf,
    /// Space-separated name filter; empty keeps everything
    pub filter: String,
}

/// Pointer-style commands aimed at one cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellCommand {
    Select,
    TogglePause,
    ToggleLoop,
    Next,
    Prev,
    ResetZoom,
    /// Zoom towards a normalized point of the cell
    ZoomAt { delta: f64, x: f64, y: f64 },
    /// Play one file; the stored playlist is kept
    PlayFile(String),
    /// Jump to an index of the current playlist
    PlayIndex(usize),
}

/// Read-only view of the wall for observers
#[derive(Debug, Clone, PartialEq)]
pub struct WallSnapshot {
    pub running: bool,
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<CellSnapshot>,
    pub selected: Option<CellId>,
    pub fullscreen: FullscreenMode,
    pub volume: u8,
    pub open_sessions: usize,
    pub restarts_total: u64,
    pub pending_deferred: usize,
}

#[derive(Debug, Clone)]
struct RunningGrid {
    request: GridRequest,
}

pub struct Wall {
    skipper: SkipperConfig,
    flush_interval: Duration,
    factory: Box<dyn EngineFactory>,
    bridge: EngineEventBridge,
    registry: CellRegistry,
    router: CommandRouter,
    watchdog: Watchdog,
    fullscreen: FullscreenController,
    accountant: SessionAccountant,
    deferred: DeferredQueue,
    events: EventBus,
    running: Option<RunningGrid>,
    generation: u64,
}

impl Wall {
    pub fn new(
        config: &WallConfig,
        factory: Box<dyn EngineFactory>,
        sink: SinkHandle,
        events: EventBus,
    ) -> Self {
        Self {
            skipper: config.skipper.clone(),
            flush_interval: Duration::from_millis(config.stats.flush_interval_ms),
            factory,
            bridge: EngineEventBridge::new(),
            registry: CellRegistry::new(),
            router: CommandRouter::new(&config.playback),
            watchdog: Watchdog::new(&config.watchdog),
            fullscreen: FullscreenController::new(),
            accountant: SessionAccountant::new(AccountingConfig::from(&config.stats), sink),
            deferred: DeferredQueue::new(),
            events,
            running: None,
            generation: 0,
        }
    }

    pub fn bridge(&self) -> &EngineEventBridge {
        &self.bridge
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &CellRegistry {
        &self.registry
    }

    pub fn accountant(&self) -> &SessionAccountant {
        &self.accountant
    }

    pub fn fullscreen_mode(&self) -> FullscreenMode {
        self.fullscreen.mode()
    }

    pub fn volume(&self) -> u8 {
        self.router.volume()
    }

    pub fn restarts_total(&self) -> u64 {
        self.watchdog.restarts_total()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Incremented on every successful grid start
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn grid_request(&self) -> Option<&GridRequest> {
        self.running.as_ref().map(|r| &r.request)
    }

    pub fn watchdog_interval(&self) -> Duration {
        self.watchdog.interval()
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn next_deferred_deadline(&self) -> Option<Instant> {
        self.deferred.next_deadline()
    }

    pub fn snapshot(&self) -> WallSnapshot {
        WallSnapshot {
            running: self.is_running(),
            rows: self.registry.rows(),
            cols: self.registry.cols(),
            cells: self.registry.cells().map(PlaybackCell::snapshot).collect(),
            selected: self.registry.selected(),
            fullscreen: self.fullscreen.mode(),
            volume: self.router.volume(),
            open_sessions: self.accountant.open_sessions(),
            restarts_total: self.watchdog.restarts_total(),
            pending_deferred: self.deferred.len(),
        }
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.events.emit_lossy(WallEvent::notice(level, message));
    }

    // ========================================================================
    // Grid lifecycle
    // ========================================================================

    /// Build the grid and start every cell on a shuffled copy of `files`
    ///
    /// A running grid is stopped first, so no two generations of engine
    /// sessions ever coexist. An empty file list fails with `NoMedia`.
    pub fn start_grid(&mut self, request: GridRequest, files: Vec<String>) -> Result<()> {
        if files.is_empty() {
            let message = format!(
                "No media found in {} (filter: {:?})",
                request.source.display(),
                request.filter
            );
            warn!("{}", message);
            self.notice(NoticeLevel::Warning, message.clone());
            return Err(Error::NoMedia(message));
        }

        self.stop_grid();

        let now = Instant::now();
        let waker = self.bridge.waker();
        if let Err(e) =
            self.registry
                .build(request.rows, request.cols, self.factory.as_mut(), &waker, now)
        {
            warn!("Grid build failed: {}", e);
            self.notice(NoticeLevel::Error, format!("Grid build failed: {}", e));
            return Err(e);
        }

        let volume = self.router.volume();
        let mut rng = rand::thread_rng();
        for cell in self.registry.cells_mut() {
            let mut playlist = files.clone();
            playlist.shuffle(&mut rng);
            cell.load_playlist(playlist);
            let engine = cell.engine_mut();
            engine.play();
            engine.set_volume(volume);
        }

        let source = request.source.to_string_lossy().into_owned();
        self.accountant.sink().send(SinkOp::GridEvent(GridEventRecord {
            kind: GridEventKind::Start,
            rows: request.rows as i64,
            cols: request.cols as i64,
            source_path: Some(source.clone()),
            filter: (!request.filter.trim().is_empty()).then(|| request.filter.clone()),
            sessions_flushed: 0,
            occurred_at: Utc::now(),
        }));
        info!(
            "Grid started: {}x{} from {} ({} files)",
            request.rows,
            request.cols,
            source,
            files.len()
        );
        self.events.emit_lossy(WallEvent::GridStarted {
            rows: request.rows,
            cols: request.cols,
            source,
            file_count: files.len(),
            timestamp: Utc::now(),
        });

        self.generation += 1;
        self.running = Some(RunningGrid { request });
        Ok(())
    }

    /// Tear the grid down; returns the number of sessions flushed
    ///
    /// Order: queued engine events, deferred tasks, open sessions, engine
    /// sessions, cell state. No-op when no grid is running.
    pub fn stop_grid(&mut self) -> usize {
        let Some(grid) = self.running.take() else {
            return 0;
        };
        // Final segments carry the last reported position
        self.drain_engine_events(Instant::now());
        self.deferred.clear();
        let flushed = self.registry.destroy(&mut self.accountant);
        // Wakeups from the released engines refer to nothing now
        self.bridge.take_pending();

        self.accountant.sink().send(SinkOp::GridEvent(GridEventRecord {
            kind: GridEventKind::Stop,
            rows: grid.request.rows as i64,
            cols: grid.request.cols as i64,
            source_path: Some(grid.request.source.to_string_lossy().into_owned()),
            filter: None,
            sessions_flushed: flushed as i64,
            occurred_at: Utc::now(),
        }));
        if self.fullscreen.reset() {
            self.emit_fullscreen();
        }

        info!(flushed, "Grid stopped");
        self.events.emit_lossy(WallEvent::GridStopped {
            sessions_flushed: flushed,
            timestamp: Utc::now(),
        });
        flushed
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub fn handle_action(&mut self, action: Action) {
        let outcome = self.router.execute(action, &mut self.registry);
        debug!(%action, ?outcome, "Action routed");
        match outcome {
            RouteOutcome::Handled { .. } | RouteOutcome::NoTarget => {}
            RouteOutcome::SelectionChanged { previous, selected } => {
                self.events
                    .emit_lossy(WallEvent::SelectionChanged { previous, selected });
            }
            RouteOutcome::VolumeChanged(volume) => {
                self.events.emit_lossy(WallEvent::VolumeChanged { volume });
            }
            RouteOutcome::Deferred { task, delay } => {
                self.deferred.schedule(task, delay, Instant::now());
            }
            RouteOutcome::Wall(request) => self.handle_wall_request(request),
        }
    }

    fn handle_wall_request(&mut self, request: WallRequest) {
        let changed = match request {
            WallRequest::ToggleWindowFullscreen => {
                self.fullscreen.toggle_window_fullscreen(&mut self.registry)
            }
            WallRequest::ExitFullscreen => {
                self.fullscreen.exit_window_fullscreen(&mut self.registry)
            }
            WallRequest::ToggleTileSelected => {
                self.fullscreen.toggle_tile_selected(&mut self.registry)
            }
            WallRequest::PanicReset => {
                let changed = self.fullscreen.exit_window_fullscreen(&mut self.registry);
                if changed {
                    self.emit_fullscreen();
                }
                self.stop_grid();
                warn!("Panic reset: grid stopped");
                self.notice(NoticeLevel::Warning, "Session reset");
                return;
            }
        };
        if changed {
            self.emit_fullscreen();
        }
    }

    fn emit_fullscreen(&self) {
        self.events.emit_lossy(WallEvent::FullscreenChanged {
            mode: self.fullscreen.mode(),
            timestamp: Utc::now(),
        });
    }

    /// Apply a pointer-style command to one cell
    ///
    /// Returns false if the cell does not exist.
    pub fn handle_cell_command(&mut self, id: CellId, command: CellCommand) -> bool {
        if let CellCommand::Select = command {
            let previous = self.registry.selected();
            if !self.registry.select(id.row, id.col) {
                return false;
            }
            if previous != Some(id) {
                self.events.emit_lossy(WallEvent::SelectionChanged {
                    previous,
                    selected: id,
                });
            }
            return true;
        }

        let Some(cell) = self.registry.cell_mut(id) else {
            return false;
        };
        let looping = cell.state().looping;
        let engine = cell.engine_mut();
        match command {
            CellCommand::Select => {}
            CellCommand::TogglePause => engine.toggle_pause(),
            CellCommand::ToggleLoop => engine.set_loop(!looping),
            CellCommand::Next => engine.next(),
            CellCommand::Prev => engine.prev(),
            CellCommand::ResetZoom => engine.reset_zoom(),
            CellCommand::ZoomAt { delta, x, y } => {
                engine.zoom_at(delta, x.clamp(0.0, 1.0), y.clamp(0.0, 1.0))
            }
            CellCommand::PlayFile(path) => {
                info!("Playing {} in {}", path, id);
                engine.load_file(&path);
            }
            CellCommand::PlayIndex(index) => engine.play_index(index),
        }
        true
    }

    /// Set the wall volume on every cell
    pub fn set_volume(&mut self, volume: u8) {
        let volume = self.router.set_volume(volume, &mut self.registry);
        self.events.emit_lossy(WallEvent::VolumeChanged { volume });
    }

    /// Give one cell its own playlist (already scanned)
    ///
    /// A single-file source loops that file.
    pub fn apply_cell_source(&mut self, id: CellId, mut files: Vec<String>) -> Result<()> {
        if files.is_empty() {
            let message = format!("No media found for {}", id);
            self.notice(NoticeLevel::Warning, message.clone());
            return Err(Error::NoMedia(message));
        }
        let volume = self.router.volume();
        let Some(cell) = self.registry.cell_mut(id) else {
            return Err(Error::NotFound(format!("Cell {}", id)));
        };

        files.shuffle(&mut rand::thread_rng());
        let count = files.len();
        cell.load_playlist(files);
        let engine = cell.engine_mut();
        engine.play();
        engine.set_volume(volume);
        if count == 1 {
            engine.set_loop(true);
            info!("{}: 1 file, looping", id);
        } else {
            info!("{}: {} files", id, count);
        }
        Ok(())
    }

    /// Propagate a completed file rename
    ///
    /// Call only after the filesystem rename succeeded. Returns the number
    /// of cells whose current file was the renamed one.
    pub fn apply_rename(&mut self, old_path: &str, new_path: &str) -> usize {
        let old_path = normalize_path(old_path);
        let new_path = normalize_path(new_path);

        let mut current = 0;
        for cell in self.registry.cells_mut() {
            if cell.rename_path(&old_path, &new_path) {
                current += 1;
            }
        }
        let retargeted = self.accountant.retarget(&old_path, &new_path);
        self.accountant.sink().send(SinkOp::Repoint {
            old_path: old_path.clone(),
            new_path: new_path.clone(),
            at: Utc::now(),
        });

        info!(current, retargeted, "Renamed {} -> {}", old_path, new_path);
        self.notice(NoticeLevel::Info, format!("Renamed {} -> {}", old_path, new_path));
        current
    }

    // ========================================================================
    // Engine events and timers
    // ========================================================================

    /// Pull and apply every pending engine event; returns how many
    pub fn drain_engine_events(&mut self, now: Instant) -> usize {
        self.bridge.take_pending();

        let Wall {
            registry,
            accountant,
            deferred,
            events,
            skipper,
            ..
        } = self;

        let mut applied = 0;
        for cell in registry.cells_mut() {
            while let Some(event) = cell.engine_mut().poll_event() {
                cell.apply_event(&event, now);
                applied += 1;
                let id = cell.id();
                match event {
                    EngineEvent::FileChanged(Some(path)) => {
                        let (duration, paused) = (cell.state().duration, cell.state().paused);
                        accountant.start_watching(id, &path, duration, is_image_path(&path), paused);
                        events.emit_lossy(WallEvent::CellFileChanged {
                            cell: id,
                            file: Some(path),
                            timestamp: Utc::now(),
                        });
                    }
                    EngineEvent::FileChanged(None) => {
                        accountant.stop_watching(id);
                        events.emit_lossy(WallEvent::CellFileChanged {
                            cell: id,
                            file: None,
                            timestamp: Utc::now(),
                        });
                    }
                    EngineEvent::PositionChanged(position) => {
                        accountant.update_position(id, position);
                        if cell.take_progress_report(position) {
                            events.emit_lossy(WallEvent::CellProgress {
                                cell: id,
                                position,
                                duration: cell.state().duration,
                            });
                        }
                    }
                    EngineEvent::DurationChanged(duration) => {
                        accountant.update_duration(id, duration);
                    }
                    EngineEvent::PauseChanged(paused) => accountant.set_paused(id, paused),
                    EngineEvent::LoopChanged(looping) => {
                        events.emit_lossy(WallEvent::CellLoopChanged { cell: id, looping });
                    }
                    EngineEvent::FileLoaded(path) => {
                        if skipper.enabled && !is_image_path(&path) && cell.mark_seen(&path) {
                            deferred.schedule(
                                DeferredTask::SkipIntro { cell: id, file: path },
                                Duration::from_millis(skipper.delay_ms),
                                now,
                            );
                        }
                    }
                }
            }
        }
        if applied > 0 {
            debug!(applied, "Engine events drained");
        }
        applied
    }

    /// Run every deferred task due at `now`
    pub fn run_deferred(&mut self, now: Instant) -> usize {
        let due = self.deferred.pop_due(now);
        let count = due.len();
        for task in due {
            match task {
                DeferredTask::NextAllUnlessLooping => {
                    let cells = step_unless_looping(&mut self.registry, true);
                    debug!(cells, "Deferred next after shuffle");
                }
                DeferredTask::SkipIntro { cell, file } => self.skip_intro(cell, &file),
            }
        }
        count
    }

    fn skip_intro(&mut self, id: CellId, file: &str) {
        let skip_percent = self.skipper.skip_percent;
        let Some(cell) = self.registry.cell_mut(id) else {
            return;
        };
        let state = cell.state();
        if state.current_file.as_deref() != Some(file) || state.duration <= 0.0 {
            return;
        }
        let target = state.duration * skip_percent;
        debug!(cell = %id, target, "Skipping intro");
        cell.engine_mut().seek_absolute(target);
    }

    /// Watchdog pass; returns the number of cells restarted
    pub fn watchdog_tick(&mut self, now: Instant) -> usize {
        let restarts = self.watchdog.check(
            &mut self.registry,
            &self.fullscreen,
            self.router.volume(),
            now,
        );
        for restart in &restarts {
            self.events.emit_lossy(WallEvent::WatchdogRestart {
                cell: restart.cell,
                playlist_len: restart.playlist_len,
                restarts_total: restart.restarts_total,
                timestamp: Utc::now(),
            });
        }
        restarts.len()
    }

    /// Periodic accounting flush; returns the number of segments recorded
    pub fn flush_tick(&mut self) -> usize {
        let recorded = self.accountant.flush_periodic();
        if recorded > 0 {
            debug!(recorded, "Periodic flush");
        }
        recorded
    }
}
