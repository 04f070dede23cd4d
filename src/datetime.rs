//! Date/time helpers shared by the store and message formatting.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

/// Default display format for publish times.
pub const DISPLAY_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Render a timestamp for storage.
///
/// Fixed-width microseconds with a `Z` suffix, so stored values sort
/// chronologically as plain text.
pub fn to_db_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// Accepts RFC3339 (what the store writes) and the SQLite
/// `YYYY-MM-DD HH:MM:SS` form produced by `datetime('now')` defaults.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Format a UTC datetime in the named timezone.
///
/// Falls back to UTC when the timezone name is not recognized.
pub fn format_utc_datetime(dt: &DateTime<Utc>, timezone: &str, format: &str) -> String {
    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => return dt.format(format).to_string(),
    };
    dt.with_timezone(&tz).format(format).to_string()
}
