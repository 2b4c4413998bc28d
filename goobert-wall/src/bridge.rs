//! Engine event bridge
//!
//! Engines call their waker from whatever thread they run callbacks on.
//! The waker only flips an atomic flag and pokes a `Notify`; the wall loop
//! owns the drain, so engine events are always applied on the loop task in
//! the order each engine produced them.
//!
//! Wakeups coalesce: any number of `wake()` calls between two drains cost
//! one loop iteration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct BridgeShared {
    pending: AtomicBool,
    notify: Notify,
    wakeups: AtomicU64,
}

/// Thread-safe wakeup handle handed to each engine
#[derive(Clone)]
pub struct EngineWaker {
    shared: Arc<BridgeShared>,
}

impl EngineWaker {
    /// Signal that at least one engine has events ready
    ///
    /// Safe to call from any thread, any number of times.
    pub fn wake(&self) {
        self.shared.wakeups.fetch_add(1, Ordering::Relaxed);
        // Only the transition to pending needs a notification; a set flag
        // means a permit is already outstanding or a drain is imminent.
        if !self.shared.pending.swap(true, Ordering::AcqRel) {
            self.shared.notify.notify_one();
        }
    }
}

impl std::fmt::Debug for EngineWaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineWaker")
            .field("pending", &self.shared.pending.load(Ordering::Relaxed))
            .finish()
    }
}

/// Loop-side half of the bridge
#[derive(Clone)]
pub struct EngineEventBridge {
    shared: Arc<BridgeShared>,
}

impl EngineEventBridge {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(BridgeShared {
                pending: AtomicBool::new(false),
                notify: Notify::new(),
                wakeups: AtomicU64::new(0),
            }),
        }
    }

    /// Create a waker for an engine
    pub fn waker(&self) -> EngineWaker {
        EngineWaker {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait until some engine has called `wake()`
    pub async fn notified(&self) {
        self.shared.notify.notified().await;
    }

    /// Clear the pending flag, returning whether it was set
    ///
    /// Must be called *before* draining engines so a wakeup that races
    /// with the drain schedules another one.
    pub fn take_pending(&self) -> bool {
        self.shared.pending.swap(false, Ordering::AcqRel)
    }

    /// Check the flag without clearing it
    pub fn is_pending(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Total `wake()` calls observed (coalesced or not)
    pub fn wakeups_total(&self) -> u64 {
        self.shared.wakeups.load(Ordering::Relaxed)
    }
}

impl Default for EngineEventBridge {
    fn default() -> Self {
        Self::new()
    }
}
