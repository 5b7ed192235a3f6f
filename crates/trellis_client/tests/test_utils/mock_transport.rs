//! Scripted transport for testing.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderName, HeaderValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trellis_client::{
    ApiError, ApiErrorKind, Client, ClientConfig, CredentialProvider, HttpOptions,
    HttpTransport, RateLimitConfig, RequestHooks, RequestInfo, RequestResult, TransportRequest,
    TransportResponse,
};

/// A single scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with a status, headers and body.
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    },
    /// Fail before any response arrives.
    NetworkError,
    /// Never respond.
    Hang,
}

impl MockReply {
    /// A bare status with an empty body.
    pub fn status(status: u16) -> Self {
        MockReply::Respond {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// `200` with a JSON body.
    pub fn json(body: &str) -> Self {
        MockReply::Respond {
            status: 200,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    /// Add a response header.
    pub fn header(self, name: &'static str, value: impl Into<String>) -> Self {
        match self {
            MockReply::Respond {
                status,
                mut headers,
                body,
            } => {
                headers.push((name, value.into()));
                MockReply::Respond {
                    status,
                    headers,
                    body,
                }
            }
            other => other,
        }
    }

    /// Replace the body.
    pub fn body(self, new_body: &str) -> Self {
        match self {
            MockReply::Respond {
                status, headers, ..
            } => MockReply::Respond {
                status,
                headers,
                body: new_body.as_bytes().to_vec(),
            },
            other => other,
        }
    }
}

/// Mock transport that replays a script and records every request.
///
/// When the script runs out, the last reply repeats.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    last: Mutex<Option<MockReply>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    /// Create a transport that plays `replies` in order.
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests seen so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_reply(&self) -> MockReply {
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last.clone().unwrap_or(MockReply::status(500)),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        self.requests.lock().unwrap().push(request);

        match self.next_reply() {
            MockReply::Respond {
                status,
                headers,
                body,
            } => {
                let mut response = TransportResponse::new(StatusCode::from_u16(status).unwrap());
                for (name, value) in headers {
                    response.headers.append(
                        HeaderName::from_static(name),
                        HeaderValue::from_str(&value).unwrap(),
                    );
                }
                response.body = body;
                Ok(response)
            }
            MockReply::NetworkError => Err(ApiError::new(ApiErrorKind::Network(
                "Connection failed".to_string(),
            ))),
            MockReply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Hooks that record every retry notification.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub starts: Mutex<Vec<u32>>,
    pub retries: Mutex<Vec<(u32, Duration)>>,
    pub cache_hits: Mutex<usize>,
}

impl RequestHooks for RecordingHooks {
    fn on_request_start(&self, info: &RequestInfo) {
        self.starts.lock().unwrap().push(info.attempt);
    }

    fn on_request_end(&self, _info: &RequestInfo, result: &RequestResult) {
        if result.from_cache {
            *self.cache_hits.lock().unwrap() += 1;
        }
    }

    fn on_retry(&self, _info: &RequestInfo, next_attempt: u32, _error: &ApiError, delay: Duration) {
        self.retries.lock().unwrap().push((next_attempt, delay));
    }
}

/// Configuration with tiny delays and a generous rate limit.
pub fn fast_config() -> ClientConfig {
    ClientConfig::default()
        .with_base_url("https://api.example.com")
        .with_http(HttpOptions {
            base_delay_ms: 10,
            max_jitter_ms: 0,
            ..Default::default()
        })
        .with_rate_limit(RateLimitConfig {
            requests_per_second: 1000.0,
            burst_size: 100,
            ..Default::default()
        })
}

/// Build a client over `transport`.
pub fn client_with(
    config: ClientConfig,
    transport: Arc<MockTransport>,
    credentials: impl CredentialProvider + 'static,
) -> Client {
    Client::builder(credentials)
        .with_config(config)
        .with_transport(transport)
        .build()
        .unwrap()
}
