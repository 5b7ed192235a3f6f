//! Request executor.
//!
//! Every call passes through the same gates in order: cancellation check,
//! bulkhead, circuit breaker, then the retry loop, where each attempt first
//! waits on the shared rate limiter. GETs use the conditional cache when one
//! is configured.

use crate::classify::{Outcome, classify};
use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::hooks::{NoopHooks, RequestHooks, RequestInfo, RequestResult};
use crate::pagination::{PageBounds, PageLimit, PageSource, follow_pagination};
use crate::retry::{Backoff, MethodSafety, RefreshState, is_refreshed_auth};
use crate::security::is_secure_endpoint;
use crate::transport::{HttpTransport, ReqwestTransport, TransportRequest};
use crate::Response;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, ETAG, HeaderMap, HeaderValue, IF_NONE_MATCH, USER_AGENT,
};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_retry2::{Retry, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use trellis_cache::{CacheKey, FileSystemCache, ResponseCache};
use trellis_error::{
    ApiError, ApiErrorKind, ConfigError, JsonError, ResilienceError, ResilienceErrorKind,
    RetryableError, TrellisResult,
};
use trellis_rate_limit::{
    Bulkhead, CircuitBreakerRegistry, CircuitState, Clock, RateLimiter, SystemClock,
};

const APPLICATION_JSON: &str = "application/json";

/// Resilient client for the project-management API.
///
/// Cheap to clone; clones share the rate limiter, cache, circuit breakers
/// and bulkhead.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    config: ClientConfig,
    base_url: String,
    user_agent: HeaderValue,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    limiter: RateLimiter,
    cache: Option<Arc<dyn ResponseCache>>,
    breakers: Option<CircuitBreakerRegistry>,
    bulkhead: Option<Bulkhead>,
    hooks: Arc<dyn RequestHooks>,
    backoff: Backoff,
}

/// One logical call.
struct Call<'a> {
    method: Method,
    url: Url,
    body: Option<Vec<u8>>,
    account: &'a str,
}

impl Client {
    /// Start building a client that authenticates with `credentials`.
    pub fn builder(credentials: impl CredentialProvider + 'static) -> ClientBuilder {
        ClientBuilder::new(Arc::new(credentials))
    }

    /// Build a client from `config` with the default transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache
    /// directory cannot be created.
    pub fn new(
        config: ClientConfig,
        credentials: impl CredentialProvider + 'static,
    ) -> TrellisResult<Self> {
        Self::builder(credentials).with_config(config).build()
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The shared rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// The conditional cache, when enabled.
    pub fn cache(&self) -> Option<&Arc<dyn ResponseCache>> {
        self.inner.cache.as_ref()
    }

    /// State of every circuit seen so far; empty when circuit breaking is off.
    pub fn circuit_states(&self) -> HashMap<String, CircuitState> {
        self.inner
            .breakers
            .as_ref()
            .map(CircuitBreakerRegistry::states)
            .unwrap_or_default()
    }

    /// Bind the client to an account.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `account_id` is empty or contains `/`.
    pub fn for_account(&self, account_id: impl Into<String>) -> Result<AccountClient, ApiError> {
        let account_id = account_id.into();
        if account_id.is_empty() || account_id.contains('/') {
            return Err(ApiError::new(ApiErrorKind::Usage(format!(
                "Invalid account id {:?}",
                account_id
            ))));
        }
        Ok(AccountClient {
            client: self.clone(),
            account_id,
        })
    }

    /// Bind the client to the configured `account_id`.
    ///
    /// # Errors
    ///
    /// Returns a usage error if no account is configured.
    pub fn for_default_account(&self) -> Result<AccountClient, ApiError> {
        match self.inner.config.account_id() {
            Some(account_id) => self.for_account(account_id.clone()),
            None => Err(ApiError::new(ApiErrorKind::Usage(
                "No account_id configured".to_string(),
            ))
            .with_hint("Set account_id in trellis.toml or TRELLIS_ACCOUNT_ID")),
        }
    }

    /// GET `path`.
    ///
    /// # Errors
    ///
    /// Returns the last observed error once retries are exhausted, or a
    /// cancellation error if `cancel` fires.
    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> TrellisResult<Response> {
        self.request(Method::GET, path, None::<&()>, cancel).await
    }

    /// POST `body` to `path`. Never replayed except after a credential
    /// refresh.
    ///
    /// # Errors
    ///
    /// Fails on any non-success response or cancellation.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        self.request(Method::POST, path, Some(body), cancel).await
    }

    /// PUT `body` to `path`.
    ///
    /// # Errors
    ///
    /// Fails on any non-success response or cancellation.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        self.request(Method::PUT, path, Some(body), cancel).await
    }

    /// PATCH `path` with `body`.
    ///
    /// # Errors
    ///
    /// Fails on any non-success response or cancellation.
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        self.request(Method::PATCH, path, Some(body), cancel).await
    }

    /// DELETE `path`.
    ///
    /// # Errors
    ///
    /// Fails on any non-success response or cancellation.
    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> TrellisResult<Response> {
        self.request(Method::DELETE, path, None::<&()>, cancel).await
    }

    /// Send an arbitrary request.
    ///
    /// `path` is either relative to the base URL or an absolute HTTPS URL.
    ///
    /// # Errors
    ///
    /// Returns a usage error for a malformed or insecure URL or an
    /// unserializable body, and otherwise whatever the executor surfaces.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        let url = self.inner.build_url(path)?;
        let body = encode_body(body)?;
        let call = Call {
            method,
            url,
            body,
            account: "",
        };
        self.inner.execute(call, cancel).await
    }

    /// Fetch every item of the collection at `path`, up to the page ceiling.
    ///
    /// # Errors
    ///
    /// Fails if any page fetch fails, a page is not a JSON array, or a
    /// continuation link leaves the first page's origin.
    pub async fn get_all(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> TrellisResult<Vec<JsonValue>> {
        self.get_all_with_limit(path, PageLimit::Unlimited, cancel).await
    }

    /// Fetch items of the collection at `path` up to `limit`.
    ///
    /// A raw limit of `0` means the configured default, a negative limit
    /// means unlimited and a positive one is an exact ceiling.
    ///
    /// # Errors
    ///
    /// As for [`Client::get_all`].
    pub async fn get_all_with_limit(
        &self,
        path: &str,
        limit: impl Into<PageLimit>,
        cancel: &CancellationToken,
    ) -> TrellisResult<Vec<JsonValue>> {
        let url = self.inner.build_url(path)?;
        self.inner.collect(url, "", limit.into(), cancel).await
    }

    /// Follow continuations after a first page the caller already fetched.
    ///
    /// Returns only the items of later pages, so that together with the
    /// `already_collected` items the caller kept there are at most `limit`.
    ///
    /// # Errors
    ///
    /// As for [`Client::get_all`].
    pub async fn follow_pagination(
        &self,
        first_page: &Response,
        already_collected: usize,
        limit: impl Into<PageLimit>,
        cancel: &CancellationToken,
    ) -> TrellisResult<Vec<JsonValue>> {
        self.inner
            .follow(first_page, already_collected, limit.into(), "", cancel)
            .await
    }
}

/// A client scoped to one account.
///
/// Relative paths are prefixed with `/{account_id}` unless they already
/// carry it. The account also namespaces cache entries.
#[derive(Debug, Clone)]
pub struct AccountClient {
    client: Client,
    account_id: String,
}

impl AccountClient {
    /// The bound account.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Prefix `path` with the account unless it is absolute or already
    /// prefixed.
    pub fn account_path(&self, path: &str) -> String {
        if is_absolute(path) {
            return path.to_string();
        }
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let prefix = format!("/{}", self.account_id);
        if path == prefix
            || path
                .strip_prefix(&prefix)
                .is_some_and(|rest| rest.starts_with(['/', '?']))
        {
            path
        } else {
            format!("{}{}", prefix, path)
        }
    }

    /// GET `path` within the account.
    ///
    /// # Errors
    ///
    /// As for [`Client::get`].
    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> TrellisResult<Response> {
        self.request(Method::GET, path, None::<&()>, cancel).await
    }

    /// POST `body` to `path` within the account.
    ///
    /// # Errors
    ///
    /// As for [`Client::post`].
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        self.request(Method::POST, path, Some(body), cancel).await
    }

    /// PUT `body` to `path` within the account.
    ///
    /// # Errors
    ///
    /// As for [`Client::put`].
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        self.request(Method::PUT, path, Some(body), cancel).await
    }

    /// DELETE `path` within the account.
    ///
    /// # Errors
    ///
    /// As for [`Client::delete`].
    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> TrellisResult<Response> {
        self.request(Method::DELETE, path, None::<&()>, cancel).await
    }

    /// Send an arbitrary request within the account.
    ///
    /// # Errors
    ///
    /// As for [`Client::request`].
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        let inner = &self.client.inner;
        let url = inner.build_url(&self.account_path(path))?;
        let body = encode_body(body)?;
        let call = Call {
            method,
            url,
            body,
            account: &self.account_id,
        };
        inner.execute(call, cancel).await
    }

    /// Fetch every item of the collection at `path`.
    ///
    /// # Errors
    ///
    /// As for [`Client::get_all`].
    pub async fn get_all(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> TrellisResult<Vec<JsonValue>> {
        self.get_all_with_limit(path, PageLimit::Unlimited, cancel).await
    }

    /// Fetch items of the collection at `path` up to `limit`.
    ///
    /// # Errors
    ///
    /// As for [`Client::get_all`].
    pub async fn get_all_with_limit(
        &self,
        path: &str,
        limit: impl Into<PageLimit>,
        cancel: &CancellationToken,
    ) -> TrellisResult<Vec<JsonValue>> {
        let inner = &self.client.inner;
        let url = inner.build_url(&self.account_path(path))?;
        inner.collect(url, &self.account_id, limit.into(), cancel).await
    }

    /// Follow continuations after a first page the caller already fetched.
    ///
    /// # Errors
    ///
    /// As for [`Client::get_all`].
    pub async fn follow_pagination(
        &self,
        first_page: &Response,
        already_collected: usize,
        limit: impl Into<PageLimit>,
        cancel: &CancellationToken,
    ) -> TrellisResult<Vec<JsonValue>> {
        self.client
            .inner
            .follow(first_page, already_collected, limit.into(), &self.account_id, cancel)
            .await
    }
}

impl ClientInner {
    fn build_url(&self, path: &str) -> Result<Url, ApiError> {
        if is_absolute(path) {
            let url = Url::parse(path).map_err(|e| {
                ApiError::new(ApiErrorKind::Usage(format!("Invalid URL {}: {}", path, e)))
            })?;
            if !is_secure_endpoint(&url) {
                return Err(ApiError::new(ApiErrorKind::Usage(format!(
                    "URL must use HTTPS: {}",
                    path
                ))));
            }
            return Ok(url);
        }

        let joined = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Url::parse(&joined).map_err(|e| {
            ApiError::new(ApiErrorKind::Usage(format!("Invalid path {}: {}", path, e)))
        })
    }

    #[instrument(skip_all, fields(method = %call.method, url = %call.url))]
    async fn execute(&self, call: Call<'_>, cancel: &CancellationToken) -> TrellisResult<Response> {
        if cancel.is_cancelled() {
            return Err(ResilienceError::cancelled().into());
        }

        let _permit = match &self.bulkhead {
            Some(bulkhead) => Some(bulkhead.acquire(cancel).await?),
            None => None,
        };

        let breaker = match &self.breakers {
            Some(registry) => {
                let scope = circuit_scope(&call.method, &call.url);
                let breaker = registry.get(&scope);
                if !breaker.allow() {
                    debug!(scope, "Circuit open, rejecting request");
                    return Err(ResilienceError::new(ResilienceErrorKind::CircuitOpen(scope)).into());
                }
                Some(breaker)
            }
            None => None,
        };

        let result = match MethodSafety::of(&call.method) {
            MethodSafety::Idempotent => self.execute_idempotent(&call, cancel).await,
            MethodSafety::Mutating => self.execute_mutation(&call, cancel).await,
        };

        if let Some(breaker) = breaker {
            match &result {
                Err(e) if e.as_api().is_some_and(ApiError::is_server_fault) => {
                    breaker.record_failure()
                }
                Err(e) if e.is_cancelled() => {}
                _ => breaker.record_success(),
            }
        }

        result
    }

    /// Up to `max_retries` attempts with backoff between them.
    async fn execute_idempotent(
        &self,
        call: &Call<'_>,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        let max_attempts = self.config.http().max_retries.max(1);
        let schedule = self.backoff.schedule(max_attempts);
        let delays = &schedule;
        let attempts = &AtomicU32::new(0);
        let refresh = &Mutex::new(RefreshState::default());

        let retry = Retry::spawn(schedule.clone(), move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let state = *refresh.lock().unwrap_or_else(PoisonError::into_inner);

            match self.attempt(call, attempt, state, cancel).await {
                Ok(response) => Ok(response),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    if let Some(api) = e.as_api() {
                        if is_refreshed_auth(api) {
                            *refresh.lock().unwrap_or_else(PoisonError::into_inner) =
                                RefreshState::Refreshed;
                        }
                        let delay = api
                            .retry_after
                            .unwrap_or(delays[(attempt - 1) as usize]);
                        self.hooks.on_retry(&call.info(attempt), attempt + 1, api, delay);
                    }
                    Err(RetryError::Transient {
                        retry_after: e.retry_after(),
                        err: e,
                    })
                }
                Err(e) => Err(RetryError::Permanent(e)),
            }
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResilienceError::cancelled().into()),
            result = retry => result,
        }
    }

    /// One attempt, plus a single replay if a `401` was cured by a refresh.
    async fn execute_mutation(
        &self,
        call: &Call<'_>,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        match self.attempt(call, 1, RefreshState::NotRefreshed, cancel).await {
            Err(e) if e.as_api().is_some_and(is_refreshed_auth) => {
                debug!(method = %call.method, "Token refreshed, retrying mutation");
                if let Some(api) = e.as_api() {
                    self.hooks
                        .on_retry(&call.info(1), 2, api, Duration::ZERO);
                }
                self.attempt(call, 2, RefreshState::Refreshed, cancel).await
            }
            other => other,
        }
    }

    /// A single HTTP exchange.
    async fn attempt(
        &self,
        call: &Call<'_>,
        attempt: u32,
        refresh: RefreshState,
        cancel: &CancellationToken,
    ) -> TrellisResult<Response> {
        self.limiter.wait(cancel).await?;

        let token = self.credentials.access_token().await?;
        let authorization = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            ApiError::new(ApiErrorKind::Auth(
                "Access token contains invalid characters".to_string(),
            ))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

        let cached = match &self.cache {
            Some(cache) if call.method == Method::GET => Some((
                cache,
                CacheKey::new(call.url.as_str(), call.account, &token),
            )),
            _ => None,
        };
        if let Some((cache, key)) = &cached
            && let Some(etag) = cache.etag(key).await
            && let Ok(value) = HeaderValue::from_str(&etag)
        {
            debug!(etag, "Sending conditional request");
            headers.insert(IF_NONE_MATCH, value);
        }

        let info = call.info(attempt);
        self.hooks.on_request_start(&info);
        let started = Instant::now();

        let request = TransportRequest {
            method: call.method.clone(),
            url: call.url.clone(),
            headers,
            body: call.body.clone(),
        };
        let deadline = self.config.http().timeout();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.hooks.on_request_end(&info, &failed(None, started, "cancelled"));
                return Err(ResilienceError::cancelled().into());
            }
            sent = tokio::time::timeout(deadline, self.transport.send(request)) => {
                sent.unwrap_or_else(|_| {
                    Err(ApiError::new(ApiErrorKind::Network("Request timed out".to_string()))
                        .with_hint("Check your network connection and try again"))
                })
            }
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                self.hooks
                    .on_request_end(&info, &failed(None, started, &e.to_string()));
                return Err(e.into());
            }
        };

        let status = response.status;
        let response_headers = response.headers.clone();
        let etag = response_headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        match classify(&call.method, &call.url, response) {
            Outcome::Success(body) => {
                if let Some((cache, key)) = &cached
                    && let Some(etag) = etag
                    && let Err(e) = cache.set(key, &body, &etag).await
                {
                    warn!(error = %e, "Failed to cache response");
                }
                self.hooks.on_request_end(
                    &info,
                    &RequestResult {
                        status: Some(status),
                        duration: started.elapsed(),
                        from_cache: false,
                        error: None,
                    },
                );
                Ok(Response::new(status, response_headers, body, call.url.clone(), false))
            }
            Outcome::NotModified => {
                let body = match &cached {
                    Some((cache, key)) => cache.body(key).await,
                    None => None,
                };
                match body {
                    Some(body) => {
                        debug!("Serving cached response");
                        self.hooks.on_request_end(
                            &info,
                            &RequestResult {
                                status: Some(status),
                                duration: started.elapsed(),
                                from_cache: true,
                                error: None,
                            },
                        );
                        Ok(Response::new(
                            StatusCode::OK,
                            response_headers,
                            body,
                            call.url.clone(),
                            true,
                        ))
                    }
                    None => {
                        let err = ApiError::new(ApiErrorKind::Api(
                            "304 Not Modified but no cached body available".to_string(),
                        ))
                        .with_status(status.as_u16());
                        self.hooks
                            .on_request_end(&info, &failed(Some(status), started, &err.to_string()));
                        Err(err.into())
                    }
                }
            }
            Outcome::Failure(err) => {
                self.hooks
                    .on_request_end(&info, &failed(Some(status), started, &err.to_string()));

                if matches!(err.kind, ApiErrorKind::RateLimit)
                    && let Some(wait) = err.retry_after
                {
                    self.limiter.set_retry_after(wait);
                }

                if status == StatusCode::UNAUTHORIZED
                    && attempt == 1
                    && refresh == RefreshState::NotRefreshed
                {
                    match self.credentials.refresh().await {
                        Ok(()) => {
                            return Err(ApiError::new(ApiErrorKind::Auth(
                                "Token refreshed".to_string(),
                            ))
                            .with_retryable(true)
                            .into());
                        }
                        Err(refresh_err) => {
                            debug!(error = %refresh_err, "Credential refresh failed");
                        }
                    }
                }

                Err(err.into())
            }
        }
    }

    async fn collect(
        &self,
        url: Url,
        account: &str,
        limit: PageLimit,
        cancel: &CancellationToken,
    ) -> TrellisResult<Vec<JsonValue>> {
        let cap = limit.resolve(self.config.http().default_list_limit);
        let first = self.execute(Call::get(url, account), cancel).await?;

        let mut items = first.items()?;
        if let Some(cap) = cap {
            items.truncate(cap);
        }

        let fetcher = PageFetcher {
            inner: self,
            account,
        };
        let bounds = PageBounds {
            limit: cap,
            max_pages: self.config.http().max_pages,
        };
        let rest = follow_pagination(&fetcher, &first, items.len(), bounds, cancel).await?;
        items.extend(rest);
        Ok(items)
    }

    async fn follow(
        &self,
        first_page: &Response,
        already_collected: usize,
        limit: PageLimit,
        account: &str,
        cancel: &CancellationToken,
    ) -> TrellisResult<Vec<JsonValue>> {
        let fetcher = PageFetcher {
            inner: self,
            account,
        };
        let bounds = PageBounds {
            limit: limit.resolve(self.config.http().default_list_limit),
            max_pages: self.config.http().max_pages,
        };
        follow_pagination(&fetcher, first_page, already_collected, bounds, cancel).await
    }
}

/// Routes page fetches through the executor.
struct PageFetcher<'a> {
    inner: &'a ClientInner,
    account: &'a str,
}

#[async_trait::async_trait]
impl PageSource for PageFetcher<'_> {
    async fn fetch_page(&self, url: &Url, cancel: &CancellationToken) -> TrellisResult<Response> {
        self.inner
            .execute(Call::get(url.clone(), self.account), cancel)
            .await
    }
}

impl<'a> Call<'a> {
    fn get(url: Url, account: &'a str) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
            account,
        }
    }

    fn info(&self, attempt: u32) -> RequestInfo {
        RequestInfo {
            method: self.method.clone(),
            url: self.url.clone(),
            attempt,
        }
    }
}

fn failed(status: Option<StatusCode>, started: Instant, error: &str) -> RequestResult {
    RequestResult {
        status,
        duration: started.elapsed(),
        from_cache: false,
        error: Some(error.to_string()),
    }
}

fn is_absolute(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

fn encode_body<B: Serialize + ?Sized>(body: Option<&B>) -> Result<Option<Vec<u8>>, JsonError> {
    body.map(|b| {
        serde_json::to_vec(b)
            .map_err(|e| JsonError::new(format!("Failed to serialize request body: {}", e)))
    })
    .transpose()
}

/// Circuit scope for a request: the method and path, with numeric path
/// segments collapsed to `:id` so every record of a kind shares a breaker.
pub fn circuit_scope(method: &Method, url: &Url) -> String {
    let path = url
        .path()
        .split('/')
        .map(|segment| {
            let stem = segment.split('.').next().unwrap_or(segment);
            if !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()) {
                format!(":id{}", &segment[stem.len()..])
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("{} {}", method, path)
}

/// Assembles a [`Client`].
///
/// Anything not supplied falls back to the configured default: a
/// reqwest transport, the system clock, a filesystem cache when
/// `cache_enabled` is set, and no hooks.
#[derive(Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
    transport: Option<Arc<dyn HttpTransport>>,
    cache: Option<Arc<dyn ResponseCache>>,
    clock: Option<Arc<dyn Clock>>,
    hooks: Option<Arc<dyn RequestHooks>>,
}

impl ClientBuilder {
    fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            config: ClientConfig::default(),
            credentials,
            transport: None,
            cache: None,
            clock: None,
            hooks: None,
        }
    }

    /// Use `config` instead of the defaults.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Send requests through `transport`.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Cache GET responses in `cache`, regardless of `cache_enabled`.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Read time for the rate limiter and circuit breakers from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Report request lifecycle events to `hooks`.
    pub fn with_hooks(mut self, hooks: Arc<dyn RequestHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the HTTP client
    /// cannot be built, or the cache directory cannot be created.
    #[instrument(skip(self), fields(base_url = %self.config.base_url()))]
    pub fn build(self) -> TrellisResult<Client> {
        let config = self.config;
        config.validate()?;

        let user_agent = HeaderValue::from_str(config.user_agent())
            .map_err(|e| ConfigError::invalid("user_agent", e))?;

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.http().timeout())?),
        };

        let cache = match self.cache {
            Some(cache) => Some(cache),
            None if *config.cache_enabled() => {
                let dir = config.effective_cache_dir();
                debug!(dir = %dir.display(), "Opening response cache");
                Some(Arc::new(FileSystemCache::new(dir)?) as Arc<dyn ResponseCache>)
            }
            None => None,
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let limiter = RateLimiter::with_clock(config.rate_limit().clone(), Arc::clone(&clock));
        let breakers = config
            .circuit_breaker()
            .clone()
            .map(|c| CircuitBreakerRegistry::with_clock(c, Arc::clone(&clock)));
        let bulkhead = config.bulkhead().clone().map(Bulkhead::new);
        let backoff = Backoff::new(config.http().base_delay(), config.http().max_jitter());

        Ok(Client {
            inner: Arc::new(ClientInner {
                base_url: config.base_url().trim_end_matches('/').to_string(),
                user_agent,
                transport,
                credentials: self.credentials,
                limiter,
                cache,
                breakers,
                bulkhead,
                hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopHooks)),
                backoff,
                config,
            }),
        })
    }
}
