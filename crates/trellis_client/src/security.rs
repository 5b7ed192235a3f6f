//! URL and header safety checks.

use reqwest::Url;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderName, HeaderValue, SET_COOKIE};

const REDACTED: &str = "[REDACTED]";

/// Headers whose values never appear in logs.
pub fn sensitive_headers() -> [HeaderName; 4] {
    [
        AUTHORIZATION,
        COOKIE,
        SET_COOKIE,
        HeaderName::from_static("x-csrf-token"),
    ]
}

/// Copy of `headers` with credential-bearing values replaced.
pub fn redact_headers(headers: &HeaderMap) -> HeaderMap {
    let mut redacted = headers.clone();
    for name in sensitive_headers() {
        if redacted.contains_key(&name) {
            redacted.insert(name, HeaderValue::from_static(REDACTED));
        }
    }
    redacted
}

/// Whether `url` points at the local machine.
///
/// Recognises `localhost`, any `*.localhost` name, and the IPv4 and IPv6
/// loopback addresses.
pub fn is_localhost(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    host.parse::<std::net::IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

/// Whether `url` is acceptable as an API endpoint: HTTPS, or any scheme
/// on localhost for local development.
pub fn is_secure_endpoint(url: &Url) -> bool {
    url.scheme().eq_ignore_ascii_case("https") || is_localhost(url)
}
