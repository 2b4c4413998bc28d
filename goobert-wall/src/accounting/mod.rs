//! Session accounting
//!
//! Tracks one open watch session per cell and turns it into durable
//! statistics. Watch time is wall-clock time minus paused time:
//!
//! ```text
//! watch = (now - running_since) - (paused_accumulator + in-progress pause)
//! ```
//!
//! **Flushes:**
//! - *Terminal* (file change, stop, grid teardown): the session closes.
//!   Below `min_session_ms` it is discarded without a write.
//! - *Periodic*: the session stays open. Below the minimum nothing happens
//!   and time keeps accumulating; otherwise the segment is written and the
//!   counters restart at the flush instant, so the next flush only reports
//!   time that has not been reported yet.
//!
//! Elapsed time uses `tokio::time::Instant`; segment timestamps are derived
//! from the segment start plus elapsed time so they stay consistent with the
//! recorded duration.

pub mod sink;
pub mod writer;

pub use sink::{SinkHandle, SinkOp};
pub use writer::{spawn_writer, WriterStats};

use chrono::{DateTime, Utc};
use goobert_common::config::StatsConfig;
use goobert_common::db::{AggregateUpdate, SessionRecord};
use goobert_common::time::local_hour_and_weekday;
use goobert_common::CellId;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountingConfig {
    /// Segments shorter than this are never recorded
    pub min_session: Duration,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            min_session: Duration::from_millis(1000),
        }
    }
}

impl From<&StatsConfig> for AccountingConfig {
    fn from(config: &StatsConfig) -> Self {
        Self {
            min_session: Duration::from_millis(config.min_session_ms),
        }
    }
}

#[derive(Debug, Clone)]
struct WatchSession {
    file: String,
    cell: CellId,
    /// Wall clock start of the current segment
    started_at: DateTime<Utc>,
    running_since: Instant,
    paused_accumulator: Duration,
    pause_started_at: Option<Instant>,
    last_known_position: f64,
    duration_hint: f64,
    is_image: bool,
}

impl WatchSession {
    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.running_since)
    }

    fn paused(&self, now: Instant) -> Duration {
        let in_progress = self
            .pause_started_at
            .map(|p| now.saturating_duration_since(p))
            .unwrap_or_default();
        self.paused_accumulator + in_progress
    }

    fn watch_time(&self, now: Instant) -> Duration {
        self.elapsed(now).saturating_sub(self.paused(now))
    }
}

fn seconds_to_ms(seconds: f64) -> i64 {
    (seconds.max(0.0) * 1000.0).round() as i64
}

pub struct SessionAccountant {
    config: AccountingConfig,
    sink: SinkHandle,
    sessions: BTreeMap<CellId, WatchSession>,
}

impl SessionAccountant {
    pub fn new(config: AccountingConfig, sink: SinkHandle) -> Self {
        Self {
            config,
            sink,
            sessions: BTreeMap::new(),
        }
    }

    pub fn sink(&self) -> &SinkHandle {
        &self.sink
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_file(&self, cell: CellId) -> Option<&str> {
        self.sessions.get(&cell).map(|s| s.file.as_str())
    }

    /// Unflushed watch time of a cell's open session
    pub fn pending_watch_time(&self, cell: CellId) -> Option<Duration> {
        self.sessions
            .get(&cell)
            .map(|s| s.watch_time(Instant::now()))
    }

    /// Open a session for `file` on `cell`
    ///
    /// Any session already open on the cell is force-flushed first. The
    /// play is counted immediately, before any watch time accrues. Engines
    /// keep their pause state across file changes, so `paused` carries the
    /// cell's current state into the new session.
    pub fn start_watching(
        &mut self,
        cell: CellId,
        file: &str,
        duration_hint: f64,
        is_image: bool,
        paused: bool,
    ) {
        if file.is_empty() {
            return;
        }
        self.stop_watching(cell);

        let now_utc = Utc::now();
        self.sink.send(SinkOp::UpsertAggregate(AggregateUpdate {
            file_path: file.to_string(),
            watch_delta_ms: 0,
            play_count_increment: 1,
            last_watched_at: now_utc,
            last_position_ms: None,
            duration_ms: (duration_hint > 0.0).then(|| seconds_to_ms(duration_hint)),
            is_image,
        }));

        debug!(%cell, file, paused, "Watch session opened");
        let now = Instant::now();
        self.sessions.insert(
            cell,
            WatchSession {
                file: file.to_string(),
                cell,
                started_at: now_utc,
                running_since: now,
                paused_accumulator: Duration::ZERO,
                pause_started_at: (paused && !is_image).then_some(now),
                last_known_position: 0.0,
                duration_hint,
                is_image,
            },
        );
    }

    pub fn update_position(&mut self, cell: CellId, seconds: f64) {
        if let Some(session) = self.sessions.get_mut(&cell) {
            session.last_known_position = seconds;
        }
    }

    pub fn update_duration(&mut self, cell: CellId, seconds: f64) {
        if let Some(session) = self.sessions.get_mut(&cell) {
            session.duration_hint = seconds;
        }
    }

    /// Track pause transitions; repeated identical states are ignored
    pub fn set_paused(&mut self, cell: CellId, paused: bool) {
        let Some(session) = self.sessions.get_mut(&cell) else {
            return;
        };
        if session.is_image {
            return;
        }
        let now = Instant::now();
        match (paused, session.pause_started_at) {
            (true, None) => session.pause_started_at = Some(now),
            (false, Some(started)) => {
                session.paused_accumulator += now.saturating_duration_since(started);
                session.pause_started_at = None;
            }
            _ => {}
        }
    }

    /// Close the cell's session (terminal flush)
    ///
    /// Returns true if a session was open.
    pub fn stop_watching(&mut self, cell: CellId) -> bool {
        let Some(session) = self.sessions.remove(&cell) else {
            return false;
        };
        let now = Instant::now();
        let watch = session.watch_time(now);
        if watch < self.config.min_session {
            debug!(%cell, file = %session.file, ms = watch.as_millis() as u64, "Short session discarded");
        } else {
            self.record(&session, watch, now);
        }
        true
    }

    /// Close every open session; returns how many were open
    pub fn stop_all(&mut self) -> usize {
        let cells: Vec<CellId> = self.sessions.keys().copied().collect();
        cells
            .into_iter()
            .filter(|cell| self.stop_watching(*cell))
            .count()
    }

    /// Write progress of every open session without closing it
    ///
    /// Returns the number of segments recorded.
    pub fn flush_periodic(&mut self) -> usize {
        let now = Instant::now();
        let min_session = self.config.min_session;
        let mut recorded = Vec::new();

        for (cell, session) in self.sessions.iter_mut() {
            let watch = session.watch_time(now);
            if watch < min_session {
                continue;
            }
            let snapshot = session.clone();
            let ended_at = Self::segment_end(session, now);
            session.started_at = ended_at;
            session.running_since = now;
            session.paused_accumulator = Duration::ZERO;
            if session.pause_started_at.is_some() {
                session.pause_started_at = Some(now);
            }
            recorded.push((*cell, snapshot, watch));
        }

        let count = recorded.len();
        for (_, snapshot, watch) in recorded {
            self.record(&snapshot, watch, now);
        }
        count
    }

    /// Point open sessions on `old_path` at `new_path`
    pub fn retarget(&mut self, old_path: &str, new_path: &str) -> usize {
        let mut count = 0;
        for session in self.sessions.values_mut().filter(|s| s.file == old_path) {
            session.file = new_path.to_string();
            count += 1;
        }
        count
    }

    fn segment_end(session: &WatchSession, now: Instant) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(session.elapsed(now))
            .unwrap_or_else(|_| chrono::Duration::zero());
        session.started_at + elapsed
    }

    fn record(&self, session: &WatchSession, watch: Duration, now: Instant) {
        let ended_at = Self::segment_end(session, now);
        let watch_ms = watch.as_millis() as i64;

        self.sink.send(SinkOp::UpsertAggregate(AggregateUpdate {
            file_path: session.file.clone(),
            watch_delta_ms: watch_ms,
            play_count_increment: 0,
            last_watched_at: ended_at,
            last_position_ms: Some(seconds_to_ms(session.last_known_position)),
            duration_ms: (session.duration_hint > 0.0).then(|| seconds_to_ms(session.duration_hint)),
            is_image: session.is_image,
        }));

        let (hour, weekday) = local_hour_and_weekday(session.started_at);
        self.sink.send(SinkOp::AppendSession(SessionRecord {
            guid: Uuid::new_v4(),
            file_path: session.file.clone(),
            started_at: session.started_at,
            ended_at,
            duration_ms: watch_ms,
            cell_row: session.cell.row as i64,
            cell_col: session.cell.col as i64,
            hour_of_day: hour as i64,
            day_of_week: weekday as i64,
        }));

        debug!(cell = %session.cell, file = %session.file, watch_ms, "Watch segment recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn accountant() -> (SessionAccountant, UnboundedReceiver<SinkOp>) {
        let (sink, rx) = SinkHandle::channel();
        (SessionAccountant::new(AccountingConfig::default(), sink), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<SinkOp>) -> Vec<SinkOp> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    /// Sum of recorded watch deltas
    fn watched_ms(ops: &[SinkOp]) -> i64 {
        ops.iter()
            .filter_map(|op| match op {
                SinkOp::UpsertAggregate(u) => Some(u.watch_delta_ms),
                _ => None,
            })
            .sum()
    }

    fn sessions(ops: &[SinkOp]) -> Vec<&SessionRecord> {
        ops.iter()
            .filter_map(|op| match op {
                SinkOp::AppendSession(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    async fn advance_ms(ms: u64) {
        tokio::time::advance(Duration::from_millis(ms)).await;
    }

    const CELL: CellId = CellId::new(0, 0);

    #[tokio::test(start_paused = true)]
    async fn test_start_counts_play_immediately() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 90.0, false, false);

        let ops = drain(&mut rx);
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            SinkOp::UpsertAggregate(u) => {
                assert_eq!(u.play_count_increment, 1);
                assert_eq!(u.watch_delta_ms, 0);
                assert_eq!(u.duration_ms, Some(90_000));
            }
            other => panic!("unexpected op {:?}", other),
        }
        assert_eq!(acc.open_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_file_ignored() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "", 0.0, false, false);
        assert_eq!(acc.open_sessions(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_time_excludes_pauses() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, false);
        advance_ms(3000).await;
        acc.set_paused(CELL, true);
        advance_ms(2000).await;
        acc.set_paused(CELL, false);
        advance_ms(5000).await;
        assert!(acc.stop_watching(CELL));

        let ops = drain(&mut rx);
        assert_eq!(watched_ms(&ops), 8000);
        let recorded = sessions(&ops);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].duration_ms, 8000);
        // Segment spans the full wall-clock time, pauses included
        assert_eq!(
            (recorded[0].ended_at - recorded[0].started_at).num_milliseconds(),
            10_000
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_progress_pause_counts_as_paused() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, false);
        advance_ms(4000).await;
        acc.set_paused(CELL, true);
        acc.set_paused(CELL, true);
        advance_ms(6000).await;
        acc.stop_watching(CELL);
        assert_eq!(watched_ms(&drain(&mut rx)), 4000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_images_ignore_pause() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.jpg", 0.0, true, false);
        acc.set_paused(CELL, true);
        advance_ms(2500).await;
        acc.stop_watching(CELL);
        assert_eq!(watched_ms(&drain(&mut rx)), 2500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_opened_on_paused_cell_starts_paused() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, true);
        advance_ms(10_000).await;
        acc.stop_watching(CELL);

        let ops = drain(&mut rx);
        assert_eq!(watched_ms(&ops), 0);
        assert!(sessions(&ops).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_paused_start() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, true);
        advance_ms(4000).await;
        acc.set_paused(CELL, false);
        advance_ms(3000).await;
        acc.stop_watching(CELL);
        assert_eq!(watched_ms(&drain(&mut rx)), 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_start_ignored_for_images() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.jpg", 0.0, true, true);
        advance_ms(2500).await;
        acc.stop_watching(CELL);
        assert_eq!(watched_ms(&drain(&mut rx)), 2500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_terminal_session_discarded() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, false);
        drain(&mut rx);
        advance_ms(999).await;
        assert!(acc.stop_watching(CELL));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(acc.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_force_flushes_previous() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, false);
        advance_ms(4000).await;
        acc.start_watching(CELL, "/m/b.mp4", 0.0, false, false);

        let ops = drain(&mut rx);
        let recorded = sessions(&ops);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].file_path, "/m/a.mp4");
        assert_eq!(recorded[0].duration_ms, 4000);
        assert_eq!(acc.session_file(CELL), Some("/m/b.mp4"));
        assert_eq!(acc.open_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_does_not_double_count() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, false);
        drain(&mut rx);

        advance_ms(10_000).await;
        assert_eq!(acc.flush_periodic(), 1);
        advance_ms(10_000).await;
        assert_eq!(acc.flush_periodic(), 1);
        advance_ms(3000).await;
        acc.stop_watching(CELL);

        let ops = drain(&mut rx);
        assert_eq!(watched_ms(&ops), 23_000);
        let recorded = sessions(&ops);
        assert_eq!(
            recorded.iter().map(|s| s.duration_ms).collect::<Vec<_>>(),
            vec![10_000, 10_000, 3000]
        );
        // Segments are contiguous
        assert_eq!(recorded[0].ended_at, recorded[1].started_at);
        assert_eq!(recorded[1].ended_at, recorded[2].started_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_below_minimum_keeps_accumulating() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, false);
        drain(&mut rx);

        advance_ms(600).await;
        assert_eq!(acc.flush_periodic(), 0);
        assert!(drain(&mut rx).is_empty());

        advance_ms(600).await;
        assert_eq!(acc.flush_periodic(), 1);
        assert_eq!(watched_ms(&drain(&mut rx)), 1200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_during_pause() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/a.mp4", 0.0, false, false);
        drain(&mut rx);

        advance_ms(5000).await;
        acc.set_paused(CELL, true);
        advance_ms(5000).await;
        assert_eq!(acc.flush_periodic(), 1);
        advance_ms(4000).await;
        acc.set_paused(CELL, false);
        advance_ms(2000).await;
        acc.stop_watching(CELL);

        // 5 s before the pause, 2 s after it
        assert_eq!(watched_ms(&drain(&mut rx)), 7000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_counts_open_sessions() {
        let (mut acc, mut rx) = accountant();
        for col in 0..3 {
            let file = format!("/m/{}.mp4", col);
            acc.start_watching(CellId::new(0, col), &file, 0.0, false, false);
        }
        advance_ms(2000).await;
        assert_eq!(acc.stop_all(), 3);
        assert_eq!(acc.open_sessions(), 0);
        assert_eq!(sessions(&drain(&mut rx)).len(), 3);
        assert_eq!(acc.stop_all(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_carries_position_and_cell() {
        let (mut acc, mut rx) = accountant();
        let cell = CellId::new(2, 1);
        acc.start_watching(cell, "/m/a.mp4", 0.0, false, false);
        acc.update_duration(cell, 120.0);
        acc.update_position(cell, 33.5);
        advance_ms(1500).await;
        acc.stop_watching(cell);

        let ops = drain(&mut rx);
        let last_upsert = ops
            .iter()
            .rev()
            .find_map(|op| match op {
                SinkOp::UpsertAggregate(u) => Some(u),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_upsert.last_position_ms, Some(33_500));
        assert_eq!(last_upsert.duration_ms, Some(120_000));
        let record = sessions(&ops)[0];
        assert_eq!((record.cell_row, record.cell_col), (2, 1));
        assert!((0..24).contains(&record.hour_of_day));
        assert!((1..=7).contains(&record.day_of_week));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_moves_future_writes() {
        let (mut acc, mut rx) = accountant();
        acc.start_watching(CELL, "/m/old.mp4", 0.0, false, false);
        acc.start_watching(CellId::new(0, 1), "/m/other.mp4", 0.0, false, false);
        drain(&mut rx);

        assert_eq!(acc.retarget("/m/old.mp4", "/m/new.mp4"), 1);
        advance_ms(2000).await;
        acc.stop_watching(CELL);

        let ops = drain(&mut rx);
        assert!(sessions(&ops).iter().all(|s| s.file_path == "/m/new.mp4"));
        assert_eq!(acc.session_file(CellId::new(0, 1)), Some("/m/other.mp4"));
    }
}
