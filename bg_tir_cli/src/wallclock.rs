//! Readings carry naive local timestamps. They are encoded as seconds since
//! the Unix epoch as if they were UTC, so calendar arithmetic (midnights,
//! weekdays) works directly on the numbers.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const FORMATS: &[&str] = &[
    "%m-%d-%Y %I:%M %p",
    "%m-%d-%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse the timestamp layouts found in exports, notes files and CLI flags.
/// Offsets in RFC 3339 input are dropped in favour of the local reading.
pub fn parse(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.naive_local());
    }
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

pub fn to_seconds(dt: NaiveDateTime) -> f64 {
    dt.and_utc().timestamp() as f64
}

pub fn from_seconds(t: f64) -> Option<NaiveDateTime> {
    if !t.is_finite() {
        return None;
    }
    DateTime::from_timestamp(t.floor() as i64, 0).map(|dt| dt.naive_utc())
}

pub fn format(t: f64, pattern: &str) -> String {
    from_seconds(t)
        .map(|dt| dt.format(pattern).to_string())
        .unwrap_or_default()
}

/// Compact stamp used in report file and directory names.
pub fn stamp(dt: NaiveDateTime) -> String {
    dt.format("%Y%m%d_%H%M%S").to_string()
}
