//! Filesystem-backed response cache.

use crate::{CacheKey, ResponseCache};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use trellis_error::{CacheError, CacheErrorKind};

const INDEX_FILE: &str = "etags.json";
const RESPONSES_DIR: &str = "responses";

type EtagIndex = BTreeMap<String, String>;

/// Durable cache rooted at a directory.
///
/// Layout:
///
/// ```text
/// {base_path}/
/// ├── etags.json            key -> ETag index
/// └── responses/
///     └── {stem}.body       cached response body, see CacheKey::file_stem
/// ```
///
/// Every file is written to a temporary sibling and renamed into place, so
/// a crash never leaves a half-written index or body. An index that cannot
/// be parsed reads as empty and is rewritten whole by the next `set`.
///
/// A single instance serialises its own writers and keeps readers from
/// observing a half-applied `set`. The body is only served while the index
/// names the key, so the pair is always read consistently.
#[derive(Debug)]
pub struct FileSystemCache {
    base_path: PathBuf,
    lock: RwLock<()>,
}

impl FileSystemCache {
    /// Open a cache rooted at `base_path`.
    ///
    /// Creates the directory if it doesn't exist. Existing entries from an
    /// earlier process are picked up as they are.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    #[tracing::instrument(skip(base_path))]
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let base_path = base_path.into();

        std::fs::create_dir_all(base_path.join(RESPONSES_DIR)).map_err(|e| {
            CacheError::new(CacheErrorKind::DirectoryCreation(format!(
                "{}: {}",
                base_path.display(),
                e
            )))
        })?;

        tracing::debug!(path = %base_path.display(), "Opened response cache");
        Ok(Self {
            base_path,
            lock: RwLock::new(()),
        })
    }

    /// Root directory of the cache.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join(INDEX_FILE)
    }

    fn body_path(&self, key: &CacheKey) -> PathBuf {
        self.base_path
            .join(RESPONSES_DIR)
            .join(format!("{}.body", key.file_stem()))
    }

    /// Read the index, substituting an empty one for anything unreadable.
    async fn read_index(&self) -> EtagIndex {
        let path = self.index_path();
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return EtagIndex::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable cache index, treating as empty");
                return EtagIndex::new();
            }
        };

        match serde_json::from_slice(&data) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt cache index, treating as empty");
                EtagIndex::new()
            }
        }
    }

    async fn write_index(&self, index: &EtagIndex) -> Result<(), CacheError> {
        let data = serde_json::to_vec_pretty(index)
            .map_err(|e| CacheError::new(CacheErrorKind::IndexEncode(e.to_string())))?;
        write_atomic(&self.index_path(), &data).await
    }
}

/// Write `data` to a temporary sibling of `path`, then rename over it.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            CacheError::new(CacheErrorKind::DirectoryCreation(format!(
                "{}: {}",
                parent.display(),
                e
            )))
        })?;
    }

    tokio::fs::write(&temp_path, data).await.map_err(|e| {
        CacheError::new(CacheErrorKind::FileWrite(format!(
            "{}: {}",
            temp_path.display(),
            e
        )))
    })?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(CacheError::new(CacheErrorKind::FileWrite(format!(
            "rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))));
    }

    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::new(CacheErrorKind::FileRemove(format!(
            "{}: {}",
            path.display(),
            e
        )))),
    }
}

#[async_trait::async_trait]
impl ResponseCache for FileSystemCache {
    async fn etag(&self, key: &CacheKey) -> Option<String> {
        let _guard = self.lock.read().await;
        let etag = self.read_index().await.remove(key.as_str())?;
        // An ETag without its body would turn a 304 into a miss
        tokio::fs::try_exists(self.body_path(key))
            .await
            .unwrap_or(false)
            .then_some(etag)
    }

    async fn body(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let _guard = self.lock.read().await;
        if !self.read_index().await.contains_key(key.as_str()) {
            return None;
        }
        tokio::fs::read(self.body_path(key)).await.ok()
    }

    #[tracing::instrument(skip(self, body, etag), fields(key = %key, size = body.len()))]
    async fn set(&self, key: &CacheKey, body: &[u8], etag: &str) -> Result<(), CacheError> {
        let _guard = self.lock.write().await;

        let body_path = self.body_path(key);
        write_atomic(&body_path, body).await?;

        let mut index = self.read_index().await;
        index.insert(key.as_str().to_string(), etag.to_string());
        if let Err(e) = self.write_index(&index).await {
            // The new body must not be served under the old ETag
            tracing::warn!(error = %e, "Index write failed, dropping entry");
            if let Err(remove_err) = remove_if_present(&body_path).await {
                tracing::warn!(error = %remove_err, "Failed to drop orphaned body");
            }
            index.remove(key.as_str());
            let _ = self.write_index(&index).await;
            return Err(e);
        }

        tracing::debug!(etag, "Cached response");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        let _guard = self.lock.write().await;

        let mut index = self.read_index().await;
        if index.remove(key.as_str()).is_some() {
            self.write_index(&index).await?;
        }
        remove_if_present(&self.body_path(key)).await?;

        tracing::debug!("Invalidated cache entry");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(path = %self.base_path.display()))]
    async fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock.write().await;

        remove_if_present(&self.index_path()).await?;

        let responses = self.base_path.join(RESPONSES_DIR);
        match tokio::fs::remove_dir_all(&responses).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CacheError::new(CacheErrorKind::FileRemove(format!(
                    "{}: {}",
                    responses.display(),
                    e
                ))));
            }
        }

        tracing::info!("Cleared response cache");
        Ok(())
    }
}
