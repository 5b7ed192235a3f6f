//! Request lifecycle hooks.
//!
//! Hooks observe individual HTTP attempts. They cannot alter or veto a
//! request; gating belongs to the rate limiter, circuit breaker and
//! bulkhead.

use reqwest::{Method, StatusCode, Url};
use std::time::Duration;
use trellis_error::ApiError;

/// One HTTP attempt.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// HTTP method
    pub method: Method,
    /// Target URL
    pub url: Url,
    /// Attempt number within the logical call, starting at 1
    pub attempt: u32,
}

/// How an attempt ended.
#[derive(Debug, Clone)]
pub struct RequestResult {
    /// Status, when a response arrived
    pub status: Option<StatusCode>,
    /// Time spent in the transport
    pub duration: Duration,
    /// Whether a `304` was answered from the cache
    pub from_cache: bool,
    /// Failure description, when the attempt failed
    pub error: Option<String>,
}

/// Observer of request attempts.
///
/// All methods default to doing nothing.
pub trait RequestHooks: Send + Sync + std::fmt::Debug {
    /// Called before an attempt is handed to the transport.
    fn on_request_start(&self, _info: &RequestInfo) {}

    /// Called after an attempt completes, successfully or not.
    fn on_request_end(&self, _info: &RequestInfo, _result: &RequestResult) {}

    /// Called before waiting to retry.
    fn on_retry(&self, _info: &RequestInfo, _next_attempt: u32, _error: &ApiError, _delay: Duration) {}
}

/// Hooks that ignore every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl RequestHooks for NoopHooks {}

/// Hooks that emit `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl RequestHooks for TracingHooks {
    fn on_request_start(&self, info: &RequestInfo) {
        tracing::debug!(method = %info.method, url = %info.url, attempt = info.attempt, "HTTP request");
    }

    fn on_request_end(&self, info: &RequestInfo, result: &RequestResult) {
        match &result.error {
            Some(error) => tracing::debug!(
                method = %info.method,
                url = %info.url,
                attempt = info.attempt,
                status = result.status.map(|s| s.as_u16()),
                duration_ms = result.duration.as_millis() as u64,
                error = %error,
                "HTTP request failed"
            ),
            None => tracing::debug!(
                method = %info.method,
                url = %info.url,
                attempt = info.attempt,
                status = result.status.map(|s| s.as_u16()),
                duration_ms = result.duration.as_millis() as u64,
                from_cache = result.from_cache,
                "HTTP response"
            ),
        }
    }

    fn on_retry(&self, info: &RequestInfo, next_attempt: u32, error: &ApiError, delay: Duration) {
        tracing::info!(
            method = %info.method,
            url = %info.url,
            next_attempt,
            delay_ms = delay.as_millis() as u64,
            code = %error.code(),
            "Retrying request"
        );
    }
}
