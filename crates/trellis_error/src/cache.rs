//! Response cache error types.

/// Kinds of cache errors.
///
/// Only mutations can fail; lookups degrade to misses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum CacheErrorKind {
    /// Failed to create cache directory
    #[display("Failed to create cache directory: {}", _0)]
    DirectoryCreation(String),
    /// Failed to write a cache file
    #[display("Failed to write cache file: {}", _0)]
    FileWrite(String),
    /// Failed to remove a cache file
    #[display("Failed to remove cache file: {}", _0)]
    FileRemove(String),
    /// Failed to encode the ETag index
    #[display("Failed to encode cache index: {}", _0)]
    IndexEncode(String),
}

/// Cache error with location tracking.
///
/// # Examples
///
/// ```
/// use trellis_error::{CacheError, CacheErrorKind};
///
/// let err = CacheError::new(CacheErrorKind::FileWrite("/tmp/etags.json".to_string()));
/// assert!(format!("{}", err).contains("etags.json"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Cache Error: {} at line {} in {}", kind, line, file)]
pub struct CacheError {
    /// The kind of error that occurred
    pub kind: CacheErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CacheError {
    /// Create a new cache error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CacheErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
