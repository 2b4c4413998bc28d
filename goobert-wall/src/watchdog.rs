//! Dead-cell watchdog
//!
//! A cell is dead when it has had no current file for at least the grace
//! period. Dead cells get their stored playlist reshuffled and reloaded.
//! The accountant learns about the new file only when the engine reports
//! it, like any other file change.

use crate::fullscreen::FullscreenController;
use crate::registry::CellRegistry;
use goobert_common::config::WatchdogConfig;
use goobert_common::CellId;
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// One restarted cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restart {
    pub cell: CellId,
    pub playlist_len: usize,
    pub restarts_total: u64,
}

#[derive(Debug)]
pub struct Watchdog {
    interval: Duration,
    grace: Duration,
    restarts_total: u64,
}

impl Watchdog {
    pub fn new(config: &WatchdogConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            grace: Duration::from_millis(config.grace_ms),
            restarts_total: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn restarts_total(&self) -> u64 {
        self.restarts_total
    }

    /// Restart every dead, visible cell
    pub fn check(
        &mut self,
        registry: &mut CellRegistry,
        fullscreen: &FullscreenController,
        volume: u8,
        now: Instant,
    ) -> Vec<Restart> {
        let mut restarts = Vec::new();
        for cell in registry.cells_mut() {
            if fullscreen.is_excluded(cell.id()) || cell.playlist().is_empty() {
                continue;
            }
            match cell.idle_for(now) {
                Some(idle) if idle >= self.grace => {}
                _ => continue,
            }

            let mut playlist = cell.playlist().to_vec();
            playlist.shuffle(&mut rand::thread_rng());
            let playlist_len = playlist.len();
            cell.load_playlist(playlist);
            let engine = cell.engine_mut();
            engine.play();
            engine.set_volume(volume);
            cell.reset_idle(now);

            self.restarts_total += 1;
            info!(
                restarts_total = self.restarts_total,
                "Watchdog restarted dead cell {} ({} files)",
                cell.id(),
                playlist_len
            );
            restarts.push(Restart {
                cell: cell.id(),
                playlist_len,
                restarts_total: self.restarts_total,
            });
        }
        restarts
    }
}
