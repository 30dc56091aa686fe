//! HTTP date handling
//!
//! Parses the date formats clients send in conditional headers and formats
//! `Date` / `Last-Modified` values.

use chrono::{NaiveDateTime, TimeZone, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Formats that `httpdate` does not cover but browsers and older clients still send.
const FALLBACK_FORMATS: &[&str] = &[
    "%a %b %d %Y %H:%M:%S GMT",
    "%a, %d %b %Y %H:%M:%S GMT",
    "%A, %d %b %y %H:%M:%S GMT",
];

/// Parse an HTTP date into milliseconds since the Unix epoch.
///
/// Accepts IMF-fixdate, RFC 850 and asctime. The obsolete dash-separated
/// form is retried with dashes replaced by spaces. Returns `None` when the
/// value is not a date at all.
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(millis) = parse_strict(value) {
        return Some(millis);
    }

    let normalized = value.replace('-', " ");
    parse_strict(&normalized).or_else(|| parse_lenient(&normalized))
}

fn parse_strict(value: &str) -> Option<i64> {
    httpdate::parse_http_date(value)
        .ok()
        .and_then(system_time_to_millis)
}

fn parse_lenient(value: &str) -> Option<i64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp_millis());
    }
    FALLBACK_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(value, fmt)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
    })
}

/// Milliseconds since the Unix epoch for a `SystemTime`
pub fn system_time_to_millis(time: SystemTime) -> Option<i64> {
    let since = time.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since.as_millis()).ok()
}

/// Current wall-clock time in milliseconds
pub fn now_millis() -> i64 {
    system_time_to_millis(SystemTime::now()).unwrap_or(0)
}

/// Format milliseconds since the epoch as an IMF-fixdate
pub fn format_http_date(millis: i64) -> String {
    let millis = u64::try_from(millis).unwrap_or(0);
    httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_millis(millis))
}

/// Current time as an IMF-fixdate, used for the `Date` header
pub fn http_date_now() -> String {
    httpdate::fmt_http_date(SystemTime::now())
}
