//! HTTP transport seam.
//!
//! The executor never talks to `reqwest` directly. It hands a fully built
//! [`TransportRequest`] to an [`HttpTransport`] and classifies whatever
//! comes back, which lets tests script responses without a network.

use crate::security::redact_headers;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use std::time::Duration;
use trellis_error::{ApiError, ApiErrorKind, HttpError};

/// Largest success body the transport will buffer (50 MiB).
pub const MAX_RESPONSE_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Largest error body the transport will buffer (1 MiB).
pub const MAX_ERROR_BODY_BYTES: usize = 1024 * 1024;

/// One outbound HTTP request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute target URL
    pub url: Url,
    /// Request headers, including credentials
    pub headers: HeaderMap,
    /// Encoded JSON body, if any
    pub body: Option<Vec<u8>>,
}

/// A response as received from the wire.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Buffered body, bounded by the transport's size limits
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

/// Something that can carry a request to the server.
///
/// Implementations report failures that happen before a response arrives
/// (connect errors, timeouts) as [`ApiErrorKind::Network`] errors. Any
/// response that does arrive, whatever its status, is returned as `Ok`.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    /// Send `request` and buffer the response.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::new(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        tracing::debug!(headers = ?redact_headers(&request.headers), "Sending request");
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let headers = response.headers().clone();

        let limit = if status.is_success() {
            MAX_RESPONSE_BODY_BYTES
        } else {
            MAX_ERROR_BODY_BYTES
        };

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(network_error)? {
            if body.len() + chunk.len() > limit {
                return Err(ApiError::new(ApiErrorKind::Api(format!(
                    "Response body exceeds {} byte limit",
                    limit
                )))
                .with_status(status.as_u16()));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn network_error(e: reqwest::Error) -> ApiError {
    let message = if e.is_timeout() {
        "Request timed out".to_string()
    } else if e.is_connect() {
        "Connection failed".to_string()
    } else {
        e.without_url().to_string()
    };
    ApiError::new(ApiErrorKind::Network(message))
        .with_hint("Check your network connection and try again")
}
