pub mod logging;

use chrono::{DateTime, TimeZone, Utc};

/// Converts a timestamp in milliseconds to a DateTime<Utc>
pub fn timestamp_to_datetime(timestamp_ms: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt,
        // Fallback to current time if timestamp is invalid
        _ => Utc::now(),
    }
}
