//! Configuration error types.

/// Configuration error raised while loading or validating client settings.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", message, line, file)]
pub struct ConfigError {
    /// Error message
    pub message: String,
    /// Offending setting, when the error concerns a single key
    pub key: Option<String>,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// Create a new ConfigError with the given message at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_error::ConfigError;
    ///
    /// let err = ConfigError::new("Failed to parse trellis.toml");
    /// assert!(err.message.contains("trellis.toml"));
    /// assert!(err.key.is_none());
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            key: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Reject the value of a single setting.
    ///
    /// ```
    /// use trellis_error::ConfigError;
    ///
    /// let err = ConfigError::invalid("rate_limit.burst_size", "must be at least 1");
    /// assert_eq!(err.key.as_deref(), Some("rate_limit.burst_size"));
    /// assert!(err.message.contains("must be at least 1"));
    /// ```
    #[track_caller]
    pub fn invalid(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let key = key.into();
        let mut err = Self::new(format!("{}: {}", key, reason));
        err.key = Some(key);
        err
    }
}
