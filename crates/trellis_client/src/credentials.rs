//! Credential supply.
//!
//! Token acquisition is out of scope for this crate. The executor only
//! needs the current bearer token and, after a `401`, a way to ask for a
//! fresh one.

use std::sync::{Arc, PoisonError, RwLock};
use trellis_error::{ApiError, ApiErrorKind};

/// Source of bearer tokens.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    /// Current access token.
    async fn access_token(&self) -> Result<String, ApiError>;

    /// Obtain a new token after the server rejected the current one.
    ///
    /// Providers that cannot refresh keep the default, which fails and so
    /// leaves the original `401` terminal.
    async fn refresh(&self) -> Result<(), ApiError> {
        Err(ApiError::new(ApiErrorKind::Auth(
            "Credential cannot be refreshed".to_string(),
        )))
    }
}

/// A fixed token that never refreshes.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.token.clone())
    }
}

/// Token that can be swapped by a refresh callback.
///
/// The callback runs on [`CredentialProvider::refresh`] and returns the
/// replacement token, or `None` if no new token could be obtained.
pub struct RefreshableToken {
    token: RwLock<String>,
    refresher: Arc<dyn Fn() -> Option<String> + Send + Sync>,
}

impl RefreshableToken {
    /// Start from `token`, refreshing through `refresher`.
    pub fn new(
        token: impl Into<String>,
        refresher: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            token: RwLock::new(token.into()),
            refresher: Arc::new(refresher),
        }
    }
}

impl std::fmt::Debug for RefreshableToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshableToken")
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl CredentialProvider for RefreshableToken {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn refresh(&self) -> Result<(), ApiError> {
        match (self.refresher)() {
            Some(token) => {
                *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
                tracing::debug!("Access token refreshed");
                Ok(())
            }
            None => Err(ApiError::new(ApiErrorKind::Auth(
                "Token refresh failed".to_string(),
            ))
            .with_hint("Re-authenticate to obtain a new token")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_cannot_refresh() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.access_token().await.unwrap(), "abc");
        assert!(provider.refresh().await.is_err());
        assert!(!format!("{:?}", provider).contains("abc"));
    }

    #[tokio::test]
    async fn test_refreshable_token_swaps_value() {
        let provider = RefreshableToken::new("old", || Some("new".to_string()));
        provider.refresh().await.unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_token() {
        let provider = RefreshableToken::new("old", || None);
        assert!(provider.refresh().await.is_err());
        assert_eq!(provider.access_token().await.unwrap(), "old");
    }
}
