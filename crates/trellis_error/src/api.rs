//! Errors surfaced from the remote API or the transport beneath it.

use crate::ErrorCode;
use std::time::Duration;

/// Maximum length of a server-provided message carried in an error.
pub const MAX_ERROR_MESSAGE_BYTES: usize = 500;

/// Kinds of API failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ApiErrorKind {
    /// Caller-supplied input was invalid; never sent to the network
    #[display("Invalid usage: {}", _0)]
    Usage(String),
    /// Authentication failed or is required (401)
    #[display("Authentication failed: {}", _0)]
    Auth(String),
    /// Access denied (403)
    #[display("Access denied: {}", _0)]
    Forbidden(String),
    /// Resource not found (404)
    #[display("Not found: {}", _0)]
    NotFound(String),
    /// Server rejected the payload (422)
    #[display("Validation failed: {}", _0)]
    Validation(String),
    /// Server asked the client to slow down (429)
    #[display("Rate limited")]
    RateLimit,
    /// Transport failure before a response arrived
    #[display("Network error: {}", _0)]
    Network(String),
    /// Any other server-side failure
    #[display("API error: {}", _0)]
    Api(String),
}

impl ApiErrorKind {
    /// Semantic code for this kind.
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiErrorKind::Usage(_) => ErrorCode::Usage,
            ApiErrorKind::Auth(_) => ErrorCode::Auth,
            ApiErrorKind::Forbidden(_) => ErrorCode::Forbidden,
            ApiErrorKind::NotFound(_) => ErrorCode::NotFound,
            ApiErrorKind::Validation(_) => ErrorCode::Validation,
            ApiErrorKind::RateLimit => ErrorCode::RateLimit,
            ApiErrorKind::Network(_) => ErrorCode::Network,
            ApiErrorKind::Api(_) => ErrorCode::Api,
        }
    }

    /// HTTP status conventionally associated with this kind, if any.
    fn default_status(&self) -> Option<u16> {
        match self {
            ApiErrorKind::Auth(_) => Some(401),
            ApiErrorKind::Forbidden(_) => Some(403),
            ApiErrorKind::NotFound(_) => Some(404),
            ApiErrorKind::Validation(_) => Some(422),
            ApiErrorKind::RateLimit => Some(429),
            _ => None,
        }
    }
}

/// API error with classification, retry metadata and location tracking.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use trellis_error::{ApiError, ApiErrorKind, ErrorCode};
///
/// let err = ApiError::new(ApiErrorKind::RateLimit)
///     .with_retry_after(Some(Duration::from_secs(5)));
/// assert_eq!(err.code(), ErrorCode::RateLimit);
/// assert_eq!(err.status, Some(429));
/// assert!(err.retryable);
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("API Error: {} at line {} in {}", kind, line, file)]
pub struct ApiError {
    /// The kind of error that occurred
    pub kind: ApiErrorKind,
    /// HTTP status code, when a response was received
    pub status: Option<u16>,
    /// Whether the retry policy may try again
    pub retryable: bool,
    /// Server-specified wait before retrying
    pub retry_after: Option<Duration>,
    /// Human-readable remediation hint
    pub hint: Option<String>,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ApiError {
    /// Create a new API error with automatic location tracking.
    ///
    /// Status and retryability default from the kind: rate-limit and
    /// network errors are retryable, everything else is terminal until
    /// overridden with [`ApiError::with_retryable`].
    #[track_caller]
    pub fn new(kind: ApiErrorKind) -> Self {
        let location = std::panic::Location::caller();
        let retryable = matches!(kind, ApiErrorKind::RateLimit | ApiErrorKind::Network(_));
        Self {
            status: kind.default_status(),
            kind,
            retryable,
            retry_after: None,
            hint: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Set the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Override the retryable flag.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach a server-specified wait.
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Semantic classification.
    pub fn code(&self) -> ErrorCode {
        self.kind.code()
    }

    /// Whether this failure should count against a circuit breaker.
    ///
    /// Only transport failures and 5xx responses indicate a sick service.
    pub fn is_server_fault(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Network(_)) || self.status.is_some_and(|s| s >= 500)
    }
}

/// Truncate a message to at most `max_len` bytes on a char boundary,
/// appending `...` when anything was cut.
pub fn truncate_message(message: &str, max_len: usize) -> String {
    if message.len() <= max_len {
        return message.to_string();
    }
    let budget = max_len.saturating_sub(3);
    let mut end = budget;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    if max_len <= 3 {
        return message[..end].to_string();
    }
    format!("{}...", &message[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_kind() {
        let err = ApiError::new(ApiErrorKind::NotFound("todo 7".into()));
        assert_eq!(err.status, Some(404));
        assert!(!err.retryable);
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = ApiError::new(ApiErrorKind::Network("connection reset".into()));
        assert!(err.retryable);
        assert!(err.is_server_fault());
    }

    #[test]
    fn test_server_fault_classification() {
        let gateway = ApiError::new(ApiErrorKind::Api("gateway".into())).with_status(503);
        assert!(gateway.is_server_fault());
        let throttled = ApiError::new(ApiErrorKind::RateLimit);
        assert!(!throttled.is_server_fault());
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short", 10), "short");
        assert_eq!(truncate_message("abcdefghij", 6), "abc...");
        assert_eq!(truncate_message("abcdef", 2), "ab");
        // Multi-byte characters are never split
        let truncated = truncate_message("ééééé", 6);
        assert!(truncated.len() <= 6);
        assert!(truncated.ends_with("..."));
    }
}
