//! Errors raised by admission gates and suspension points.

/// Kinds of resilience failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ResilienceErrorKind {
    /// The caller's cancellation signal fired while suspended
    #[display("Operation cancelled")]
    Cancelled,
    /// The circuit breaker for a scope is open
    #[display("Circuit breaker is open for {}", _0)]
    CircuitOpen(String),
    /// No concurrency slot became free in time
    #[display("Bulkhead is full")]
    BulkheadFull,
}

/// Resilience error with location tracking.
///
/// # Examples
///
/// ```
/// use trellis_error::{ResilienceError, ResilienceErrorKind};
///
/// let err = ResilienceError::new(ResilienceErrorKind::Cancelled);
/// assert!(err.is_cancelled());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Resilience Error: {} at line {} in {}", kind, line, file)]
pub struct ResilienceError {
    /// The kind of error that occurred
    pub kind: ResilienceErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ResilienceError {
    /// Create a new resilience error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ResilienceErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for a cancellation error.
    #[track_caller]
    pub fn cancelled() -> Self {
        Self::new(ResilienceErrorKind::Cancelled)
    }

    /// True when this error came from a cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ResilienceErrorKind::Cancelled
    }
}
