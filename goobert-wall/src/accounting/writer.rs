//! Stats writer task
//!
//! Drains the accounting channel into the statistics database. The task
//! ends once every `SinkHandle` is dropped and the channel is empty, so
//! awaiting its `JoinHandle` guarantees every queued op was attempted.

use super::sink::SinkOp;
use goobert_common::db::StatsDb;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome counters of a finished writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub applied: u64,
    pub failed: u64,
}

pub fn spawn_writer(db: StatsDb, mut rx: mpsc::UnboundedReceiver<SinkOp>) -> JoinHandle<WriterStats> {
    tokio::spawn(async move {
        let mut stats = WriterStats::default();
        while let Some(op) = rx.recv().await {
            match db.apply(&op).await {
                Ok(()) => stats.applied += 1,
                Err(e) => {
                    // A failed write never stops the writer
                    warn!(op = op.kind(), "Stats write failed: {}", e);
                    stats.failed += 1;
                }
            }
        }
        debug!(applied = stats.applied, failed = stats.failed, "Stats writer finished");
        stats
    })
}
