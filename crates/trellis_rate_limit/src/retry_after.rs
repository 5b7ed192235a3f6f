//! Parsing of the `Retry-After` response header.
//!
//! Servers send either a delay in whole seconds or an HTTP-date. Values
//! that are missing, malformed, zero, or already in the past yield `None`
//! and the caller falls back to its own backoff.

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::trace;

/// Obsolete HTTP-date layouts still accepted from servers: RFC 850 and
/// C `asctime`. Both are implicitly GMT.
const LEGACY_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %T GMT", "%a %b %e %T %Y"];

/// Name of the slow-down header.
pub const RETRY_AFTER: &str = "retry-after";

/// Read the `Retry-After` header from a response.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after_value(value, Utc::now())
}

/// Parse a raw `Retry-After` value relative to `now`.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use std::time::Duration;
/// use trellis_rate_limit::parse_retry_after_value;
///
/// assert_eq!(parse_retry_after_value("30", Utc::now()), Some(Duration::from_secs(30)));
/// assert_eq!(parse_retry_after_value("soon", Utc::now()), None);
/// ```
pub fn parse_retry_after_value(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<u64>() {
        return (seconds > 0).then(|| Duration::from_secs(seconds));
    }

    let date = parse_http_date(value)?;
    let seconds = date.signed_duration_since(now).num_seconds();
    trace!(value, seconds, "Parsed HTTP-date Retry-After");
    u64::try_from(seconds)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

/// Parse any of the three HTTP-date forms.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    LEGACY_DATE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}
