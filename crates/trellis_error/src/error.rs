//! Top-level error wrapper types.

use crate::{
    ApiError, CacheError, ConfigError, ErrorCode, HttpError, JsonError, ResilienceError,
    ResilienceErrorKind,
};

/// Every failure the Trellis crates can report.
///
/// # Examples
///
/// ```
/// use trellis_error::{TrellisError, HttpError};
///
/// let http_err = HttpError::new("Connection failed");
/// let err: TrellisError = http_err.into();
/// assert!(format!("{}", err).contains("HTTP Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum TrellisErrorKind {
    /// Remote API or transport failure
    #[from(ApiError)]
    Api(ApiError),
    /// Cancellation or admission gate rejection
    #[from(ResilienceError)]
    Resilience(ResilienceError),
    /// Response cache mutation failure
    #[from(CacheError)]
    Cache(CacheError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// URL construction or continuation-link error
    #[from(HttpError)]
    Http(HttpError),
    /// Payload decoding error
    #[from(JsonError)]
    Json(JsonError),
}

/// Trellis error with kind discrimination.
///
/// # Examples
///
/// ```
/// use trellis_error::{TrellisResult, ConfigError};
///
/// fn might_fail() -> TrellisResult<()> {
///     Err(ConfigError::new("Missing base_url"))?
/// }
///
/// match might_fail() {
///     Ok(_) => println!("Success"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Trellis Error: {}", _0)]
pub struct TrellisError(Box<TrellisErrorKind>);

impl TrellisError {
    /// Create a new error from a kind.
    pub fn new(kind: TrellisErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &TrellisErrorKind {
        &self.0
    }

    /// The API error, if this is one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self.kind() {
            TrellisErrorKind::Api(e) => Some(e),
            _ => None,
        }
    }

    /// True when a caller's cancellation signal ended the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind(), TrellisErrorKind::Resilience(e) if e.kind == ResilienceErrorKind::Cancelled)
    }

    /// Semantic classification for reporting.
    ///
    /// Errors raised before any request was sent classify as usage errors.
    pub fn code(&self) -> ErrorCode {
        match self.kind() {
            TrellisErrorKind::Api(e) => e.code(),
            TrellisErrorKind::Config(_) | TrellisErrorKind::Http(_) => ErrorCode::Usage,
            TrellisErrorKind::Resilience(_)
            | TrellisErrorKind::Cache(_)
            | TrellisErrorKind::Json(_) => ErrorCode::Api,
        }
    }
}

// Generic From implementation for any type that converts to TrellisErrorKind
impl<T> From<T> for TrellisError
where
    T: Into<TrellisErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Trellis operations.
///
/// # Examples
///
/// ```
/// use trellis_error::{TrellisResult, HttpError};
///
/// fn build_url() -> TrellisResult<String> {
///     Err(HttpError::new("URL must use HTTPS"))?
/// }
/// ```
pub type TrellisResult<T> = std::result::Result<T, TrellisError>;
