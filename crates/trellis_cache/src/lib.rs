//! Durable ETag response cache.
//!
//! Successful responses that carry an `ETag` are stored so that the next
//! fetch of the same resource can be made conditional. A `304 Not Modified`
//! reply is then served from the stored body.
//!
//! Entries are keyed by [`CacheKey`], derived from the request URL, the
//! account identifier and the credential. Two callers that differ in any of
//! the three never see each other's entries.
//!
//! # Example
//!
//! ```rust
//! use trellis_cache::{CacheKey, FileSystemCache, ResponseCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = FileSystemCache::new("/tmp/trellis-cache")?;
//! let key = CacheKey::new("https://api.example.com/1/projects.json", "1", "token");
//!
//! cache.set(&key, br#"[{"id":1}]"#, "\"abc\"").await?;
//! assert_eq!(cache.etag(&key).await.as_deref(), Some("\"abc\""));
//! # Ok(())
//! # }
//! ```

mod cache;
mod filesystem;
mod key;
mod memory;

pub use cache::ResponseCache;
pub use filesystem::FileSystemCache;
pub use key::CacheKey;
pub use memory::MemoryCache;
pub use trellis_error::{CacheError, CacheErrorKind};
