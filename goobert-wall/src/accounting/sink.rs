//! Non-blocking accounting sink
//!
//! The accountant never waits on the database: ops go onto an unbounded
//! channel and a writer task applies them in order.

pub use goobert_common::db::SinkOp;

use tokio::sync::mpsc;
use tracing::debug;

/// Sending half of the accounting channel
///
/// A disabled sink (statistics turned off) silently drops every op.
#[derive(Clone, Debug)]
pub struct SinkHandle {
    tx: Option<mpsc::UnboundedSender<SinkOp>>,
}

impl SinkHandle {
    /// Create a connected sink and its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn send(&self, op: SinkOp) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.send(op) {
                debug!(op = e.0.kind(), "Accounting sink closed, op dropped");
            }
        }
    }
}
