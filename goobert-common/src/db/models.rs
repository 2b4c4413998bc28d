//! Database models
//!
//! Row types returned by the statistics queries and the `SinkOp` write
//! operations produced by the session accountant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Durable per-file aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub file_path: String,
    pub total_watch_ms: i64,
    pub play_count: i64,
    pub last_watched_at: Option<DateTime<Utc>>,
    pub last_position_ms: i64,
    pub duration_ms: i64,
    pub is_image: bool,
}

/// One flushed watch segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub guid: Uuid,
    pub file_path: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub cell_row: i64,
    pub cell_col: i64,
    /// Local hour, 0-23
    pub hour_of_day: i64,
    /// 1 = Monday .. 7 = Sunday
    pub day_of_week: i64,
}

/// Aggregate increment for one file
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateUpdate {
    pub file_path: String,
    /// Added to `total_watch_ms`; negative values are treated as zero
    pub watch_delta_ms: i64,
    pub play_count_increment: i64,
    pub last_watched_at: DateTime<Utc>,
    /// `None` keeps the stored position
    pub last_position_ms: Option<i64>,
    /// `None` (or zero) keeps the stored duration
    pub duration_ms: Option<i64>,
    pub is_image: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridEventKind {
    Start,
    Stop,
}

impl GridEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridEventKind::Start => "start",
            GridEventKind::Stop => "stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(GridEventKind::Start),
            "stop" => Some(GridEventKind::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for GridEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridEventRecord {
    pub kind: GridEventKind,
    pub rows: i64,
    pub cols: i64,
    pub source_path: Option<String>,
    pub filter: Option<String>,
    pub sessions_flushed: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameRecord {
    pub old_path: String,
    pub new_path: String,
    pub renamed_at: DateTime<Utc>,
}

/// Watch time bucketed by local hour of day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyStats {
    pub hour_of_day: i64,
    pub total_ms: i64,
    pub sessions: i64,
}

/// Watch time bucketed by weekday (1 = Monday)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub day_of_week: i64,
    pub total_ms: i64,
    pub sessions: i64,
}

/// One write for the statistics database
///
/// Ops are applied strictly in the order they were produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOp {
    UpsertAggregate(AggregateUpdate),
    AppendSession(SessionRecord),
    /// Move the aggregate (and its sessions) from `old_path` to `new_path`
    Repoint {
        old_path: String,
        new_path: String,
        at: DateTime<Utc>,
    },
    GridEvent(GridEventRecord),
}

impl SinkOp {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SinkOp::UpsertAggregate(_) => "upsert_aggregate",
            SinkOp::AppendSession(_) => "append_session",
            SinkOp::Repoint { .. } => "repoint",
            SinkOp::GridEvent(_) => "grid_event",
        }
    }
}
