//! Database initialization
//!
//! Creates the statistics database on first run and brings the schema up
//! to date. Every `CREATE` is idempotent so opening an existing database
//! is the same code path.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Open (creating if needed) the statistics database at `db_path`
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets the stats CLI read while the wall writer is active
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_file_stats_table(pool).await?;
    create_watch_sessions_table(pool).await?;
    create_rename_history_table(pool).await?;
    create_grid_events_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Per-file aggregate, keyed by normalized path
async fn create_file_stats_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL UNIQUE,
            total_watch_ms INTEGER NOT NULL DEFAULT 0 CHECK (total_watch_ms >= 0),
            play_count INTEGER NOT NULL DEFAULT 0,
            last_watched_at TIMESTAMP,
            last_position_ms INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            is_image INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_file_stats_watch ON file_stats(total_watch_ms DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Immutable per-segment watch records
async fn create_watch_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS watch_sessions (
            guid TEXT PRIMARY KEY,
            file_id INTEGER NOT NULL REFERENCES file_stats(id) ON DELETE CASCADE,
            started_at TIMESTAMP NOT NULL,
            ended_at TIMESTAMP NOT NULL,
            duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0),
            cell_row INTEGER NOT NULL,
            cell_col INTEGER NOT NULL,
            hour_of_day INTEGER NOT NULL CHECK (hour_of_day BETWEEN 0 AND 23),
            day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 1 AND 7)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_watch_sessions_file ON watch_sessions(file_id, started_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_rename_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rename_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            old_path TEXT NOT NULL,
            new_path TEXT NOT NULL,
            renamed_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Grid start/stop log
async fn create_grid_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grid_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK (kind IN ('start', 'stop')),
            rows INTEGER NOT NULL,
            cols INTEGER NOT NULL,
            source_path TEXT,
            filter TEXT,
            sessions_flushed INTEGER NOT NULL DEFAULT 0,
            occurred_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
