//! Semantic error codes and process exit codes.

/// Semantic classification of a failed call.
///
/// The string form is stable and suitable for machine-readable output.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    /// Caller supplied invalid input
    Usage,
    /// Resource does not exist
    NotFound,
    /// Missing or rejected credentials
    #[strum(serialize = "auth_required")]
    Auth,
    /// Credentials lack access
    Forbidden,
    /// Server rejected the payload
    Validation,
    /// Server asked the client to slow down
    RateLimit,
    /// Transport failure before a response arrived
    Network,
    /// Any other server-side failure
    #[strum(serialize = "api_error")]
    Api,
}

impl ErrorCode {
    /// Exit code a command-line tool should use for this classification.
    pub fn exit_code(self) -> ExitCode {
        match self {
            ErrorCode::Usage => ExitCode::Usage,
            ErrorCode::NotFound => ExitCode::NotFound,
            ErrorCode::Auth => ExitCode::Auth,
            ErrorCode::Forbidden => ExitCode::Forbidden,
            ErrorCode::RateLimit => ExitCode::RateLimit,
            ErrorCode::Network => ExitCode::Network,
            ErrorCode::Validation | ErrorCode::Api => ExitCode::Api,
        }
    }
}

/// Process exit codes for command-line tools built on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Ok = 0,
    /// Invalid arguments or flags
    Usage = 1,
    /// Resource not found
    NotFound = 2,
    /// Not authenticated
    Auth = 3,
    /// Access denied
    Forbidden = 4,
    /// Rate limited (429)
    RateLimit = 5,
    /// Connection, DNS or timeout error
    Network = 6,
    /// Server returned an error
    Api = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}
