//! Retry budget and backoff.
//!
//! Idempotent requests get up to `max_retries` attempts, separated by an
//! exponential delay plus random jitter, or by the server's own wait when
//! it sent one. Mutating requests are never blindly replayed: they get a
//! single second attempt, and only after a `401` was resolved by a
//! credential refresh.

use rand::Rng;
use reqwest::Method;
use std::time::Duration;
use trellis_error::{ApiError, ErrorCode};

/// Whether replaying a request could duplicate a side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum MethodSafety {
    /// Reads; safe to repeat.
    #[strum(serialize = "idempotent")]
    Idempotent,
    /// Creates, updates and deletes.
    #[strum(serialize = "mutating")]
    Mutating,
}

impl MethodSafety {
    /// Classify an HTTP method.
    pub fn of(method: &Method) -> Self {
        if *method == Method::POST
            || *method == Method::PUT
            || *method == Method::PATCH
            || *method == Method::DELETE
        {
            MethodSafety::Mutating
        } else {
            MethodSafety::Idempotent
        }
    }
}

/// Whether a credential refresh already happened during this call.
///
/// Threaded through the attempts of one logical call so that a second
/// `401` after a refresh is terminal instead of looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    /// No refresh attempted yet.
    #[default]
    NotRefreshed,
    /// The credential was refreshed after a `401`.
    Refreshed,
}

/// True when `error` is the retryable auth outcome of a successful refresh.
pub fn is_refreshed_auth(error: &ApiError) -> bool {
    error.retryable && error.code() == ErrorCode::Auth
}

/// Exponential backoff with bounded jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base_delay: Duration,
    max_jitter: Duration,
}

impl Backoff {
    /// Create a backoff schedule.
    pub fn new(base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            base_delay,
            max_jitter,
        }
    }

    /// Delay before retry number `retry` (0 for the first retry).
    ///
    /// `base_delay * 2^retry` plus a random jitter in `[0, max_jitter)`.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let exponential = self.base_delay.saturating_mul(factor);

        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };

        exponential.saturating_add(jitter)
    }

    /// Delays between `max_attempts` attempts, one fewer than the attempts.
    pub fn schedule(&self, max_attempts: u32) -> Vec<Duration> {
        (0..max_attempts.saturating_sub(1))
            .map(|retry| self.delay(retry))
            .collect()
    }
}
