//! Event types for the Goobert event system
//!
//! Provides the UI-facing `WallEvent` stream and the `EventBus` that carries it.

mod cell_types;

pub use cell_types::{CellId, FullscreenMode};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Wall event types
///
/// Events are broadcast via EventBus and are serde-serializable so observers
/// (terminal driver, JSON event dump) can forward them unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WallEvent {
    /// Grid built and every cell loaded with its playlist
    GridStarted {
        rows: usize,
        cols: usize,
        /// Source directory or file the grid was started from
        source: String,
        /// Number of media files found by the scan
        file_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Grid torn down
    ///
    /// `sessions_flushed` counts watch sessions force-flushed during the stop.
    GridStopped {
        sessions_flushed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Cell reported a new current file (or lost it)
    CellFileChanged {
        cell: CellId,
        file: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback position update (throttled)
    CellProgress {
        cell: CellId,
        position: f64,
        duration: f64,
    },

    /// Loop flag of a cell changed
    CellLoopChanged {
        cell: CellId,
        looping: bool,
    },

    /// Selection moved to a different cell
    SelectionChanged {
        previous: Option<CellId>,
        selected: CellId,
    },

    /// Fullscreen controller changed state
    FullscreenChanged {
        mode: FullscreenMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Wall-wide volume changed
    VolumeChanged {
        volume: u8,
    },

    /// Watchdog restarted a dead cell from its stored playlist
    WatchdogRestart {
        cell: CellId,
        playlist_len: usize,
        /// Total restarts since the wall was created
        restarts_total: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User-facing notice (scan found nothing, rename failed, ...)
    Notice {
        level: NoticeLevel,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Severity of a `WallEvent::Notice`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl WallEvent {
    /// Event type name, identical to the serde `type` tag
    pub fn event_type(&self) -> &str {
        match self {
            WallEvent::GridStarted { .. } => "GridStarted",
            WallEvent::GridStopped { .. } => "GridStopped",
            WallEvent::CellFileChanged { .. } => "CellFileChanged",
            WallEvent::CellProgress { .. } => "CellProgress",
            WallEvent::CellLoopChanged { .. } => "CellLoopChanged",
            WallEvent::SelectionChanged { .. } => "SelectionChanged",
            WallEvent::FullscreenChanged { .. } => "FullscreenChanged",
            WallEvent::VolumeChanged { .. } => "VolumeChanged",
            WallEvent::WatchdogRestart { .. } => "WatchdogRestart",
            WallEvent::Notice { .. } => "Notice",
        }
    }

    /// Build a notice stamped with the current time
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        WallEvent::Notice {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Broadcast bus for wall events
///
/// Cloning is cheap; every clone shares the same channel. Slow receivers
/// lag and lose the oldest events rather than blocking the wall loop.
///
/// # Examples
///
/// ```
/// use goobert_common::events::{EventBus, WallEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit(WallEvent::VolumeChanged { volume: 35 }).ok();
/// assert_eq!(rx.try_recv().unwrap().event_type(), "VolumeChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WallEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<WallEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: WallEvent,
    ) -> Result<usize, broadcast::error::SendError<WallEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: WallEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(10);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(WallEvent::VolumeChanged { volume: 10 }).is_err());
        // Lossy variant never fails
        bus.emit_lossy(WallEvent::VolumeChanged { volume: 10 });
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let delivered = bus
            .emit(WallEvent::CellLoopChanged {
                cell: CellId::new(0, 1),
                looping: true,
            })
            .expect("emit should succeed");
        assert_eq!(delivered, 2);

        assert_eq!(rx1.try_recv().unwrap().event_type(), "CellLoopChanged");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "CellLoopChanged");
    }

    #[test]
    fn test_eventbus_emit_lossy_on_full_channel() {
        let bus = EventBus::new(2);
        let _rx = bus.subscribe();
        for i in 0..10 {
            bus.emit_lossy(WallEvent::CellProgress {
                cell: CellId::new(0, 0),
                position: i as f64,
                duration: 100.0,
            });
        }
        assert_eq!(bus.capacity(), 2);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = WallEvent::SelectionChanged {
            previous: None,
            selected: CellId::new(1, 2),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SelectionChanged");
        assert_eq!(json["selected"]["row"], 1);
        assert_eq!(json["selected"]["col"], 2);

        let back: WallEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "SelectionChanged");
    }

    #[test]
    fn test_fullscreen_event_serializes_mode() {
        let event = WallEvent::FullscreenChanged {
            mode: FullscreenMode::Tile { cell: CellId::new(1, 1) },
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["mode"]["mode"], "tile");
        assert_eq!(json["mode"]["cell"]["row"], 1);
    }

    #[test]
    fn test_notice_helper() {
        match WallEvent::notice(NoticeLevel::Warning, "no media") {
            WallEvent::Notice { level, message, .. } => {
                assert_eq!(level, NoticeLevel::Warning);
                assert_eq!(message, "no media");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
