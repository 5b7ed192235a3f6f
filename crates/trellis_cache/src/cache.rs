//! Cache trait definition.

use crate::CacheKey;
use trellis_error::CacheError;

/// Store of `(ETag, body)` pairs.
///
/// Lookups never fail: an unknown key and an unreadable store both read
/// as a miss. Only mutations report errors, and the executor treats those
/// as diagnostics rather than request failures.
///
/// Implementations must be safe to share between concurrent callers
/// without outside coordination, and a reader must never see an ETag
/// without its body or the reverse.
#[async_trait::async_trait]
pub trait ResponseCache: Send + Sync + std::fmt::Debug {
    /// ETag stored for `key`.
    async fn etag(&self, key: &CacheKey) -> Option<String>;

    /// Body stored for `key`.
    async fn body(&self, key: &CacheKey) -> Option<Vec<u8>>;

    /// Store `body` and `etag` under `key`, replacing any prior entry.
    async fn set(&self, key: &CacheKey, body: &[u8], etag: &str) -> Result<(), CacheError>;

    /// Remove the entry for `key` only.
    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), CacheError>;
}
