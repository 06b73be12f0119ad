//! Operations module provides the CLI-facing tasks built on the engines

use chrono::DateTime;
use chrono_tz::America::Los_Angeles;

pub mod comment;
pub mod comments;
pub mod posts;
pub mod stream;

/// Render a UTC epoch timestamp in Los Angeles time.
pub(crate) fn local_time(created_utc: f64, format: &str) -> String {
    match DateTime::from_timestamp(created_utc as i64, 0) {
        Some(time) => time.with_timezone(&Los_Angeles).format(format).to_string(),
        None => "unknown time".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_time_converts_to_pacific() {
        // 2024-01-01T20:00:00Z is noon in Los Angeles (PST).
        assert_eq!(local_time(1704139200.0, "%Y-%m-%d %H:%M"), "2024-01-01 12:00");
    }
}
