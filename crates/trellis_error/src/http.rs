//! URL and request-construction errors.

/// Error for requests that cannot be built or followed safely.
///
/// Raised before anything reaches the network: malformed URLs, insecure
/// schemes, and continuation links that leave the original origin.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("HTTP Error: {} at line {} in {}", message, line, file)]
pub struct HttpError {
    /// The underlying error message
    pub message: String,
    /// The URL involved, if one was available
    pub url: Option<String>,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl HttpError {
    /// Create a new HttpError with the given message at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_error::HttpError;
    ///
    /// let err = HttpError::new("URL must use HTTPS");
    /// assert!(err.message.contains("HTTPS"));
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            url: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Create an error that names the offending URL.
    #[track_caller]
    pub fn for_url(message: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut err = Self::new(format!("{}: {}", message.into(), url));
        err.url = Some(url);
        err
    }
}
