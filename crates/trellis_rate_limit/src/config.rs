//! Configuration structures for the admission gates.
//!
//! All structures deserialize from the `[rate_limit]`, `[circuit_breaker]`
//! and `[bulkhead]` tables of `trellis.toml`. Missing keys fall back to the
//! production defaults. Durations are expressed in milliseconds.
//!
//! ```toml
//! [rate_limit]
//! requests_per_second = 50.0
//! burst_size = 10
//! respect_retry_after = true
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use trellis_error::ConfigError;

/// Token bucket settings.
///
/// The clock is not part of the file format; inject one with
/// [`RateLimiter::with_clock`](crate::RateLimiter::with_clock).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained refill rate. Fractional rates are allowed.
    pub requests_per_second: f64,

    /// Bucket capacity, and the number of tokens a fresh bucket holds.
    pub burst_size: u32,

    /// Honor server slow-down signals (`429` with `Retry-After`) by blocking
    /// every caller of the limiter until the window passes.
    pub respect_retry_after: bool,

    /// Longest wait `reserve` reports as a short poll; anything further out
    /// is reported as [`Reservation::Blocked`](crate::Reservation::Blocked).
    pub max_reserve_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 50.0,
            burst_size: 10,
            respect_retry_after: true,
            max_reserve_wait_ms: 1_000,
        }
    }
}

impl RateLimitConfig {
    /// Reserve ceiling as a duration.
    pub fn max_reserve_wait(&self) -> Duration {
        Duration::from_millis(self.max_reserve_wait_ms)
    }

    /// Check that the bucket can ever admit a request.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive or non-finite rate, or a zero burst.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(ConfigError::invalid(
                "rate_limit.requests_per_second",
                format!("must be positive, got {}", self.requests_per_second),
            ));
        }
        if self.burst_size == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.burst_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,

    /// Successes in half-open state needed to close the circuit.
    pub success_threshold: u32,

    /// How long an open circuit rejects calls before probing.
    pub open_timeout_ms: u64,

    /// Failure percentage over the sliding window that opens the circuit.
    pub failure_rate_threshold: f64,

    /// Number of recent outcomes considered for the failure rate.
    pub sliding_window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout_ms: 30_000,
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
        }
    }
}

impl CircuitBreakerConfig {
    /// Open timeout as a duration.
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Check thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error for zero thresholds, an empty window, or a rate
    /// outside `(0, 100]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.success_threshold",
                "must be at least 1",
            ));
        }
        if self.sliding_window_size == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.sliding_window_size",
                "must be at least 1",
            ));
        }
        if self.failure_rate_threshold <= 0.0 || self.failure_rate_threshold > 100.0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.failure_rate_threshold",
                format!("must be in (0, 100], got {}", self.failure_rate_threshold),
            ));
        }
        Ok(())
    }
}

/// Bulkhead settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Maximum concurrent in-flight calls.
    pub max_concurrent: usize,

    /// How long to wait for a slot. Zero fails immediately when full.
    pub max_wait_ms: u64,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_wait_ms: 5_000,
        }
    }
}

impl BulkheadConfig {
    /// Slot wait as a duration.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Check the concurrency cap.
    ///
    /// # Errors
    ///
    /// Returns an error when `max_concurrent` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "bulkhead.max_concurrent",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
