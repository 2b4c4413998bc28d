//! Statistics database
//!
//! `StatsDb` applies accountant `SinkOp`s and answers the read-side
//! statistics queries. All paths are normalized before they touch the
//! database, so callers may pass raw file references.

use crate::db::models::{
    AggregateUpdate, DailyStats, FileStats, GridEventKind, GridEventRecord, HourlyStats,
    RenameRecord, SessionRecord, SinkOp,
};
use crate::paths::normalize_path;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

type FileStatsRow = (String, i64, i64, Option<DateTime<Utc>>, i64, i64, bool);
type SessionRow = (String, String, DateTime<Utc>, DateTime<Utc>, i64, i64, i64, i64, i64);

const FILE_STATS_COLUMNS: &str = "file_path, total_watch_ms, play_count, last_watched_at, \
                                  last_position_ms, duration_ms, is_image";

fn file_stats_from_row(row: FileStatsRow) -> FileStats {
    FileStats {
        file_path: row.0,
        total_watch_ms: row.1,
        play_count: row.2,
        last_watched_at: row.3,
        last_position_ms: row.4,
        duration_ms: row.5,
        is_image: row.6,
    }
}

fn session_from_row(row: SessionRow) -> Result<SessionRecord> {
    let guid = Uuid::parse_str(&row.0)
        .map_err(|e| Error::Internal(format!("Corrupt session guid {}: {}", row.0, e)))?;
    Ok(SessionRecord {
        guid,
        file_path: row.1,
        started_at: row.2,
        ended_at: row.3,
        duration_ms: row.4,
        cell_row: row.5,
        cell_col: row.6,
        hour_of_day: row.7,
        day_of_week: row.8,
    })
}

/// Handle to the statistics database
#[derive(Clone)]
pub struct StatsDb {
    pool: SqlitePool,
}

impl StatsDb {
    /// Wrap a pool whose schema is already created
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply one accountant write
    pub async fn apply(&self, op: &SinkOp) -> Result<()> {
        debug!(op = op.kind(), "Applying stats op");
        match op {
            SinkOp::UpsertAggregate(update) => self.upsert_aggregate(update).await,
            SinkOp::AppendSession(record) => self.append_session(record).await,
            SinkOp::Repoint {
                old_path,
                new_path,
                at,
            } => self.repoint(old_path, new_path, *at).await,
            SinkOp::GridEvent(record) => self.record_grid_event(record).await,
        }
    }

    async fn upsert_aggregate(&self, update: &AggregateUpdate) -> Result<()> {
        let path = normalize_path(&update.file_path);
        sqlx::query(
            r#"
            INSERT INTO file_stats
                (file_path, total_watch_ms, play_count, last_watched_at,
                 last_position_ms, duration_ms, is_image)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_path) DO UPDATE SET
                total_watch_ms = file_stats.total_watch_ms + excluded.total_watch_ms,
                play_count = file_stats.play_count + excluded.play_count,
                last_watched_at = excluded.last_watched_at,
                last_position_ms = CASE WHEN ? THEN excluded.last_position_ms
                                        ELSE file_stats.last_position_ms END,
                duration_ms = CASE WHEN excluded.duration_ms > 0 THEN excluded.duration_ms
                                   ELSE file_stats.duration_ms END,
                is_image = excluded.is_image,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&path)
        .bind(update.watch_delta_ms.max(0))
        .bind(update.play_count_increment)
        .bind(update.last_watched_at)
        .bind(update.last_position_ms.unwrap_or(0))
        .bind(update.duration_ms.unwrap_or(0))
        .bind(update.is_image)
        .bind(update.last_position_ms.is_some())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_session(&self, record: &SessionRecord) -> Result<()> {
        let path = normalize_path(&record.file_path);
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO file_stats (file_path) VALUES (?)")
            .bind(&path)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO watch_sessions
                (guid, file_id, started_at, ended_at, duration_ms,
                 cell_row, cell_col, hour_of_day, day_of_week)
            SELECT ?, id, ?, ?, ?, ?, ?, ?, ? FROM file_stats WHERE file_path = ?
            "#,
        )
        .bind(record.guid.to_string())
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(record.duration_ms.max(0))
        .bind(record.cell_row)
        .bind(record.cell_col)
        .bind(record.hour_of_day)
        .bind(record.day_of_week)
        .bind(&path)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Move an aggregate to a new path, merging into an existing row
    async fn repoint(&self, old_path: &str, new_path: &str, at: DateTime<Utc>) -> Result<()> {
        let old_path = normalize_path(old_path);
        let new_path = normalize_path(new_path);
        if old_path == new_path {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let old_row: Option<(i64, i64, i64, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT id, total_watch_ms, play_count, last_watched_at FROM file_stats WHERE file_path = ?",
        )
        .bind(&old_path)
        .fetch_optional(&mut *tx)
        .await?;

        let new_id: Option<i64> = sqlx::query_scalar("SELECT id FROM file_stats WHERE file_path = ?")
            .bind(&new_path)
            .fetch_optional(&mut *tx)
            .await?;

        match (old_row, new_id) {
            (Some((old_id, watch_ms, plays, last_watched)), Some(new_id)) => {
                sqlx::query(
                    r#"
                    UPDATE file_stats SET
                        total_watch_ms = total_watch_ms + ?,
                        play_count = play_count + ?,
                        last_watched_at = CASE
                            WHEN last_watched_at IS NULL OR last_watched_at < ? THEN ?
                            ELSE last_watched_at END,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = ?
                    "#,
                )
                .bind(watch_ms)
                .bind(plays)
                .bind(last_watched)
                .bind(last_watched)
                .bind(new_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query("UPDATE watch_sessions SET file_id = ? WHERE file_id = ?")
                    .bind(new_id)
                    .bind(old_id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query("DELETE FROM file_stats WHERE id = ?")
                    .bind(old_id)
                    .execute(&mut *tx)
                    .await?;
            }
            (Some((old_id, ..)), None) => {
                sqlx::query(
                    "UPDATE file_stats SET file_path = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                )
                .bind(&new_path)
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
            }
            (None, _) => {}
        }

        sqlx::query("INSERT INTO rename_history (old_path, new_path, renamed_at) VALUES (?, ?, ?)")
            .bind(&old_path)
            .bind(&new_path)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_grid_event(&self, record: &GridEventRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO grid_events
                (kind, rows, cols, source_path, filter, sessions_flushed, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.kind.as_str())
        .bind(record.rows)
        .bind(record.cols)
        .bind(&record.source_path)
        .bind(&record.filter)
        .bind(record.sessions_flushed)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregate for one file
    pub async fn get_stats(&self, path: &str) -> Result<Option<FileStats>> {
        let sql = format!("SELECT {} FROM file_stats WHERE file_path = ?", FILE_STATS_COLUMNS);
        let row: Option<FileStatsRow> = sqlx::query_as(&sql)
            .bind(normalize_path(path))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(file_stats_from_row))
    }

    /// Files ordered by total watch time, most watched first
    pub async fn most_watched(&self, limit: i64) -> Result<Vec<FileStats>> {
        let sql = format!(
            "SELECT {} FROM file_stats WHERE total_watch_ms > 0 \
             ORDER BY total_watch_ms DESC, file_path ASC LIMIT ?",
            FILE_STATS_COLUMNS
        );
        let rows: Vec<FileStatsRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(file_stats_from_row).collect())
    }

    /// Files ordered by last watch, newest first
    pub async fn recently_watched(&self, limit: i64) -> Result<Vec<FileStats>> {
        let sql = format!(
            "SELECT {} FROM file_stats WHERE last_watched_at IS NOT NULL \
             ORDER BY last_watched_at DESC, file_path ASC LIMIT ?",
            FILE_STATS_COLUMNS
        );
        let rows: Vec<FileStatsRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(file_stats_from_row).collect())
    }

    pub async fn total_watch_ms(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(total_watch_ms), 0) FROM file_stats")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    pub async fn total_files_tracked(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_stats")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Last reported playback position, if the file is known
    pub async fn last_position(&self, path: &str) -> Result<Option<i64>> {
        let position: Option<i64> =
            sqlx::query_scalar("SELECT last_position_ms FROM file_stats WHERE file_path = ?")
                .bind(normalize_path(path))
                .fetch_optional(&self.pool)
                .await?;
        Ok(position)
    }

    /// Sessions for one file, newest first
    pub async fn sessions_for_file(&self, path: &str, limit: i64) -> Result<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT s.guid, f.file_path, s.started_at, s.ended_at, s.duration_ms,
                   s.cell_row, s.cell_col, s.hour_of_day, s.day_of_week
            FROM watch_sessions s
            JOIN file_stats f ON f.id = s.file_id
            WHERE f.file_path = ?
            ORDER BY s.started_at DESC
            LIMIT ?
            "#,
        )
        .bind(normalize_path(path))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(session_from_row).collect()
    }

    /// Watch time per local hour (only hours with sessions)
    pub async fn hourly_distribution(&self) -> Result<Vec<HourlyStats>> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT hour_of_day, SUM(duration_ms), COUNT(*)
            FROM watch_sessions
            GROUP BY hour_of_day
            ORDER BY hour_of_day
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(hour_of_day, total_ms, sessions)| HourlyStats {
                hour_of_day,
                total_ms,
                sessions,
            })
            .collect())
    }

    /// Watch time per weekday (only days with sessions)
    pub async fn daily_distribution(&self) -> Result<Vec<DailyStats>> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT day_of_week, SUM(duration_ms), COUNT(*)
            FROM watch_sessions
            GROUP BY day_of_week
            ORDER BY day_of_week
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(day_of_week, total_ms, sessions)| DailyStats {
                day_of_week,
                total_ms,
                sessions,
            })
            .collect())
    }

    pub async fn rename_history(&self, limit: i64) -> Result<Vec<RenameRecord>> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT old_path, new_path, renamed_at FROM rename_history ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(old_path, new_path, renamed_at)| RenameRecord {
                old_path,
                new_path,
                renamed_at,
            })
            .collect())
    }

    /// Grid start/stop log, newest first
    pub async fn grid_history(&self, limit: i64) -> Result<Vec<GridEventRecord>> {
        let rows: Vec<(String, i64, i64, Option<String>, Option<String>, i64, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT kind, rows, cols, source_path, filter, sessions_flushed, occurred_at
                FROM grid_events
                ORDER BY id DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(kind, rows, cols, source_path, filter, sessions_flushed, occurred_at)| {
                let kind = GridEventKind::parse(&kind)
                    .ok_or_else(|| Error::Internal(format!("Unknown grid event kind: {}", kind)))?;
                Ok(GridEventRecord {
                    kind,
                    rows,
                    cols,
                    source_path,
                    filter,
                    sessions_flushed,
                    occurred_at,
                })
            })
            .collect()
    }
}
