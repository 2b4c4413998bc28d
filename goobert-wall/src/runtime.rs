//! Wall loop
//!
//! One task owns the `Wall` and multiplexes, with `tokio::select!`, over:
//! - external commands (`WallHandle`)
//! - results of blocking work (scans, renames) run on `spawn_blocking`
//! - engine wakeups from the event bridge
//! - the watchdog and flush intervals (only while a grid runs)
//! - the earliest deferred task
//!
//! The loop ends on `WallHandle::shutdown()` or when every handle is
//! dropped; either way the grid is stopped and open sessions flushed.

use crate::action::Action;
use crate::error::{Error, Result};
use crate::scanner::{scan_all, NameFilter};
use crate::wall::{CellCommand, GridRequest, Wall, WallSnapshot};
use goobert_common::events::NoticeLevel;
use goobert_common::{CellId, WallEvent};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Commands accepted by the wall loop
#[derive(Debug)]
pub enum WallCommand {
    /// Scan the source, then build and start the grid
    StartGrid(GridRequest),
    StopGrid,
    Action(Action),
    Cell { cell: CellId, command: CellCommand },
    SetVolume(u8),
    /// Scan `paths` and give `cell` its own playlist
    CellSource { cell: CellId, paths: Vec<PathBuf>, filter: String },
    /// Rename a media file on disk and retarget everything pointing at it
    Rename { old_path: String, new_path: String },
    Snapshot(oneshot::Sender<WallSnapshot>),
    Shutdown(oneshot::Sender<WallReport>),
}

/// Results of blocking work, fed back into the loop
enum Completion {
    GridScanned {
        request: GridRequest,
        result: Result<Vec<String>>,
    },
    SourceScanned {
        cell: CellId,
        generation: u64,
        result: Result<Vec<String>>,
    },
    Renamed {
        old_path: String,
        new_path: String,
        result: std::io::Result<()>,
    },
}

/// Final counters of a finished wall loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WallReport {
    pub sessions_flushed: usize,
    pub restarts_total: u64,
}

/// Cloneable sender side of the wall loop
#[derive(Clone, Debug)]
pub struct WallHandle {
    tx: mpsc::UnboundedSender<WallCommand>,
}

impl WallHandle {
    pub fn send(&self, command: WallCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::InvalidState("Wall loop has stopped".to_string()))
    }

    pub fn action(&self, action: Action) -> Result<()> {
        self.send(WallCommand::Action(action))
    }

    pub fn start_grid(&self, request: GridRequest) -> Result<()> {
        self.send(WallCommand::StartGrid(request))
    }

    pub fn stop_grid(&self) -> Result<()> {
        self.send(WallCommand::StopGrid)
    }

    pub async fn snapshot(&self) -> Result<WallSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(WallCommand::Snapshot(tx))?;
        rx.await
            .map_err(|_| Error::InvalidState("Wall loop dropped the snapshot request".to_string()))
    }

    /// Stop the grid, flush every session and end the loop
    pub async fn shutdown(&self) -> Result<WallReport> {
        let (tx, rx) = oneshot::channel();
        self.send(WallCommand::Shutdown(tx))?;
        rx.await
            .map_err(|_| Error::InvalidState("Wall loop ended before shutdown".to_string()))
    }
}

/// Spawn the wall loop on the current runtime
pub fn spawn_wall(wall: Wall) -> (WallHandle, JoinHandle<WallReport>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_wall(wall, rx));
    (WallHandle { tx }, task)
}

/// Grid-scoped timers
#[derive(Default)]
struct Timers {
    generation: u64,
    watchdog: Option<Interval>,
    flush: Option<Interval>,
}

impl Timers {
    /// Create timers for a new grid, drop them when the grid is gone
    fn sync(&mut self, wall: &Wall) {
        if !wall.is_running() {
            if self.watchdog.is_some() {
                debug!("Grid timers dropped");
            }
            self.watchdog = None;
            self.flush = None;
            return;
        }
        if self.watchdog.is_some() && self.generation == wall.generation() {
            return;
        }
        self.generation = wall.generation();
        self.watchdog = Some(periodic(wall.watchdog_interval()));
        self.flush = Some(periodic(wall.flush_interval()));
        debug!(generation = self.generation, "Grid timers created");
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

pub async fn run_wall(mut wall: Wall, mut commands: mpsc::UnboundedReceiver<WallCommand>) -> WallReport {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let bridge = wall.bridge().clone();
    let mut timers = Timers::default();
    let mut shutdown_reply: Option<oneshot::Sender<WallReport>> = None;

    info!("Wall loop started");
    loop {
        let deadline = wall.next_deferred_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(WallCommand::Shutdown(reply)) => {
                    shutdown_reply = Some(reply);
                    break;
                }
                Some(command) => handle_command(&mut wall, command, &done_tx),
                None => {
                    debug!("Every wall handle dropped");
                    break;
                }
            },
            Some(done) = done_rx.recv() => handle_completion(&mut wall, done),
            _ = bridge.notified() => {
                wall.drain_engine_events(Instant::now());
            }
            _ = tick(&mut timers.watchdog) => {
                wall.watchdog_tick(Instant::now());
            }
            _ = tick(&mut timers.flush) => {
                wall.flush_tick();
            }
            _ = sleep_until(deadline) => {
                wall.run_deferred(Instant::now());
            }
        }
        timers.sync(&wall);
    }

    let report = WallReport {
        sessions_flushed: wall.stop_grid(),
        restarts_total: wall.restarts_total(),
    };
    info!(
        sessions_flushed = report.sessions_flushed,
        restarts_total = report.restarts_total,
        "Wall loop finished"
    );
    if let Some(reply) = shutdown_reply {
        let _ = reply.send(report);
    }
    report
}

fn handle_command(wall: &mut Wall, command: WallCommand, done: &mpsc::UnboundedSender<Completion>) {
    match command {
        WallCommand::StartGrid(request) => {
            let done = done.clone();
            let roots = vec![request.source.clone()];
            let filter = NameFilter::new(&request.filter);
            tokio::task::spawn_blocking(move || {
                let result = scan_all(&roots, &filter);
                let _ = done.send(Completion::GridScanned { request, result });
            });
        }
        WallCommand::StopGrid => {
            wall.stop_grid();
        }
        WallCommand::Action(action) => wall.handle_action(action),
        WallCommand::Cell { cell, command } => {
            if !wall.handle_cell_command(cell, command) {
                debug!(%cell, "Cell command for missing cell ignored");
            }
        }
        WallCommand::SetVolume(volume) => wall.set_volume(volume),
        WallCommand::CellSource { cell, paths, filter } => {
            let done = done.clone();
            let generation = wall.generation();
            let filter = NameFilter::new(&filter);
            tokio::task::spawn_blocking(move || {
                let result = scan_all(&paths, &filter);
                let _ = done.send(Completion::SourceScanned { cell, generation, result });
            });
        }
        WallCommand::Rename { old_path, new_path } => {
            let done = done.clone();
            tokio::task::spawn_blocking(move || {
                let result = std::fs::rename(&old_path, &new_path);
                let _ = done.send(Completion::Renamed { old_path, new_path, result });
            });
        }
        WallCommand::Snapshot(reply) => {
            let _ = reply.send(wall.snapshot());
        }
        WallCommand::Shutdown(_) => {}
    }
}

fn handle_completion(wall: &mut Wall, done: Completion) {
    match done {
        Completion::GridScanned { request, result } => match result {
            Ok(files) => {
                // The wall reports its own start failures
                if let Err(e) = wall.start_grid(request, files) {
                    debug!("Grid not started: {}", e);
                }
            }
            Err(e) => {
                warn!("Scan of {} failed: {}", request.source.display(), e);
                wall.events().emit_lossy(WallEvent::notice(
                    NoticeLevel::Error,
                    format!("Cannot start grid from {}: {}", request.source.display(), e),
                ));
            }
        },
        Completion::SourceScanned { cell, generation, result } => {
            if generation != wall.generation() || !wall.is_running() {
                debug!(%cell, "Source scan finished after the grid changed, dropped");
                return;
            }
            let outcome = result.and_then(|files| wall.apply_cell_source(cell, files));
            if let Err(e) = outcome {
                warn!(%cell, "Custom source failed: {}", e);
            }
        }
        Completion::Renamed { old_path, new_path, result } => match result {
            Ok(()) => {
                wall.apply_rename(&old_path, &new_path);
            }
            Err(e) => {
                warn!("Rename {} -> {} failed: {}", old_path, new_path, e);
                wall.events().emit_lossy(WallEvent::notice(
                    NoticeLevel::Error,
                    format!("Rename failed: {}", e),
                ));
            }
        },
    }
}
