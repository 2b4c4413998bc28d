//! Timestamp utilities

use chrono::{DateTime, Datelike, Local, Timelike, Utc};

/// Local hour of day (0-23) and ISO weekday (1 = Monday .. 7 = Sunday)
pub fn local_hour_and_weekday(at: DateTime<Utc>) -> (u32, u32) {
    let local = at.with_timezone(&Local);
    (local.hour(), local.weekday().number_from_monday())
}

/// Format a watch time for display: `42s`, `3m 07s`, `2h 15m`
pub fn format_watch_ms(ms: i64) -> String {
    let seconds = ms.max(0) / 1000;
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {:02}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
