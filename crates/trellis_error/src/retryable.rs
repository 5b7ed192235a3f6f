//! Retry classification shared by the retry policy and callers.

use crate::{ApiError, TrellisError, TrellisErrorKind};
use std::time::Duration;

/// Trait for errors that support retry logic.
///
/// # Examples
///
/// ```
/// use trellis_error::{ApiError, ApiErrorKind, RetryableError};
///
/// let err = ApiError::new(ApiErrorKind::Api("Gateway error (503)".into()))
///     .with_status(503)
///     .with_retryable(true);
/// assert!(err.is_retryable());
/// assert!(err.retry_after().is_none());
/// ```
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    ///
    /// Transient errors like 503, 429 or transport failures return true.
    /// Permanent errors like 401, 404 or 422 return false.
    fn is_retryable(&self) -> bool;

    /// Server-specified wait before the next attempt, if one was given.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for ApiError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl RetryableError for TrellisError {
    fn is_retryable(&self) -> bool {
        match self.kind() {
            TrellisErrorKind::Api(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.as_api().and_then(RetryableError::retry_after)
    }
}
