//! Cache key derivation.

use sha2::{Digest, Sha256};

/// Opaque cache key.
///
/// A SHA-256 digest over the request URL, the account identifier and a
/// digest of the credential. Each component is length-prefixed, so no
/// choice of inputs can make two different triples hash the same bytes.
/// The credential itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request.
    pub fn new(url: &str, account_id: &str, credential: &str) -> Self {
        let credential_hash = if credential.is_empty() {
            String::new()
        } else {
            let digest = Sha256::digest(credential.as_bytes());
            format!("{:x}", digest)
        };

        let mut hasher = Sha256::new();
        for part in [url, account_id, credential_hash.as_str()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name safe to use as a file stem.
    ///
    /// Derived keys are already 64 lowercase hex digits and are used as they
    /// are. Any other string, such as one wrapped with `From<&str>`, is
    /// hashed so it can never name a path outside its directory.
    pub fn file_stem(&self) -> String {
        let is_digest = self.0.len() == 64
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if is_digest {
            self.0.clone()
        } else {
            format!("{:x}", Sha256::digest(self.0.as_bytes()))
        }
    }
}

impl From<&str> for CacheKey {
    /// Wrap an existing key string as-is.
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
