//! Timestamp column detection and parsing.
//!
//! Ingestion only needs two things from a timestamp implementation: which header column holds
//! the event time, and how to turn one cell into epoch milliseconds in a given timezone. Both are
//! behind [`TimestampResolver`] so a host application can plug in its own formats.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Timezone name meaning "interpret naive timestamps as UTC".
pub const UTC: &str = "UTC";
/// Timezone name meaning "interpret naive timestamps in the host's local zone".
pub const LOCAL: &str = "Local";

/// Collaborator used to find and parse the time column of a source.
pub trait TimestampResolver: Send + Sync {
    /// Index of the column holding the event time, if any.
    fn detect_timestamp_index(&self, header: &[String]) -> Option<usize>;

    /// Parse a single cell into epoch milliseconds, interpreting naive values in `timezone`.
    fn parse_timestamp_millis(&self, cell: &str, timezone: &str) -> Option<i64>;

    /// Session-wide ingest timezone.
    fn default_ingest_timezone(&self) -> String;

    /// Effective timezone for a file: the override when present, otherwise the default.
    fn ingest_timezone_with_override(&self, override_tz: Option<&str>) -> String {
        match override_tz.map(str::trim) {
            Some(tz) if !tz.is_empty() => tz.to_owned(),
            _ => self.default_ingest_timezone(),
        }
    }
}

/// Column names checked for an exact (case-insensitive) match, in priority order.
const EXACT_NAMES: &[&str] = &["@timestamp", "timestamp", "time"];
/// Substrings checked when no exact match exists, in priority order.
const CONTAINED_NAMES: &[&str] = &["@timestamp", "timestamp", "datetime", "date", "time", "ts"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Epoch values at or above this magnitude are taken to be milliseconds already.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Built-in resolver backed by `chrono`.
///
/// Understands RFC 3339, common naive date-time layouts, bare dates and epoch seconds or
/// milliseconds. Timezones are `UTC`, `Local` or a fixed offset such as `+02:00`.
#[derive(Debug, Clone)]
pub struct DefaultTimestamps {
    default_timezone: String,
}

impl Default for DefaultTimestamps {
    fn default() -> Self {
        Self::new(UTC)
    }
}

impl DefaultTimestamps {
    pub fn new(default_timezone: impl Into<String>) -> Self {
        Self {
            default_timezone: default_timezone.into(),
        }
    }
}

impl TimestampResolver for DefaultTimestamps {
    fn detect_timestamp_index(&self, header: &[String]) -> Option<usize> {
        let lowered: Vec<String> = header.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        EXACT_NAMES
            .iter()
            .find_map(|name| lowered.iter().position(|h| h == name))
            .or_else(|| {
                CONTAINED_NAMES
                    .iter()
                    .find_map(|name| lowered.iter().position(|h| h.contains(name)))
            })
    }

    fn parse_timestamp_millis(&self, cell: &str, timezone: &str) -> Option<i64> {
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        if let Some(ms) = parse_epoch(cell) {
            return Some(ms);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
            return Some(dt.timestamp_millis());
        }
        if let Ok(dt) = DateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S%.f %z") {
            return Some(dt.timestamp_millis());
        }
        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(cell, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })?;
        localize(&naive, timezone)
    }

    fn default_ingest_timezone(&self) -> String {
        self.default_timezone.clone()
    }
}

fn parse_epoch(cell: &str) -> Option<i64> {
    let digits = cell.strip_prefix('-').unwrap_or(cell);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: i64 = cell.parse().ok()?;
    if n.abs() >= MILLIS_THRESHOLD {
        Some(n)
    } else {
        n.checked_mul(1000)
    }
}

fn localize(naive: &NaiveDateTime, timezone: &str) -> Option<i64> {
    let tz = timezone.trim();
    if tz.is_empty() || tz.eq_ignore_ascii_case(UTC) || tz.eq_ignore_ascii_case("Z") {
        return Some(Utc.from_utc_datetime(naive).timestamp_millis());
    }
    if tz.eq_ignore_ascii_case(LOCAL) {
        return Local
            .from_local_datetime(naive)
            .earliest()
            .map(|dt| dt.timestamp_millis());
    }
    match tz.parse::<FixedOffset>() {
        Ok(offset) => offset
            .from_local_datetime(naive)
            .single()
            .map(|dt| dt.timestamp_millis()),
        Err(_) => {
            tracing::debug!(timezone = tz, "unknown timezone, falling back to UTC");
            Some(Utc.from_utc_datetime(naive).timestamp_millis())
        }
    }
}
