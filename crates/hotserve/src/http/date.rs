//! HTTP date formatting and parsing.
//!
//! Dates are exchanged as IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
//! Parsing also accepts RFC 2822 variants with numeric offsets. All values
//! are milliseconds since the epoch at one-second resolution.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a millisecond timestamp as an IMF-fixdate.
pub fn format_http_date(millis: u64) -> String {
    let secs = (millis / 1000) as i64;
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_default()
        .format(IMF_FIXDATE)
        .to_string()
}

/// Parse an HTTP date header into milliseconds since the epoch.
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, IMF_FIXDATE) {
        return Some(naive.and_utc().timestamp_millis());
    }

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.timestamp_millis())
}
