//! Response classification.
//!
//! Maps a received response onto success, a conditional-cache hit, or an
//! [`ApiError`] carrying the semantic code, retryable flag and any
//! server-specified wait.
//!
//! | Status            | Code        | Retryable |
//! |-------------------|-------------|-----------|
//! | 2xx               | success     |           |
//! | 304               | cache hit   |           |
//! | 401               | `auth`      | no        |
//! | 403               | `forbidden` | no        |
//! | 404               | `not_found` | no        |
//! | 422               | `validation`| no        |
//! | 429               | `rate_limit`| yes       |
//! | 5xx               | `api_error` | yes       |
//! | anything else     | `api_error` | no        |

use crate::TransportResponse;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use trellis_error::{ApiError, ApiErrorKind, MAX_ERROR_MESSAGE_BYTES, truncate_message};
use trellis_rate_limit::parse_retry_after;

/// What a single response means for the caller.
#[derive(Debug)]
pub enum Outcome {
    /// The request succeeded. A `204` body is normalised to JSON `null`.
    Success(Vec<u8>),
    /// The server confirmed the cached copy is still current.
    NotModified,
    /// The request failed.
    Failure(ApiError),
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Pull a human-readable message out of a JSON error body.
///
/// Prefers `error`, falls back to `message`, and truncates to
/// [`MAX_ERROR_MESSAGE_BYTES`].
pub fn extract_error_message(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    parsed
        .error
        .filter(|m| !m.is_empty())
        .or(parsed.message.filter(|m| !m.is_empty()))
        .map(|m| truncate_message(&m, MAX_ERROR_MESSAGE_BYTES))
}

/// Classify `response` to a `method` request for `url`.
pub fn classify(method: &Method, url: &Url, response: TransportResponse) -> Outcome {
    let status = response.status;
    let code = status.as_u16();

    if status == StatusCode::NO_CONTENT {
        return Outcome::Success(b"null".to_vec());
    }
    if status.is_success() {
        return Outcome::Success(response.body);
    }
    if status == StatusCode::NOT_MODIFIED {
        return Outcome::NotModified;
    }

    let server_message = extract_error_message(&response.body);

    let error = match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::new(ApiErrorKind::RateLimit)
            .with_retry_after(parse_retry_after(&response.headers))
            .with_hint("Slow down and retry after the indicated delay"),
        StatusCode::UNAUTHORIZED => ApiError::new(ApiErrorKind::Auth(
            server_message.unwrap_or_else(|| "Authentication failed".to_string()),
        ))
        .with_hint("Check that your access token is valid"),
        StatusCode::FORBIDDEN => {
            let err = ApiError::new(ApiErrorKind::Forbidden(
                server_message.unwrap_or_else(|| "Access denied".to_string()),
            ));
            if *method == Method::GET {
                err
            } else {
                err.with_hint("Your token may lack write scope for this resource")
            }
        }
        StatusCode::NOT_FOUND => {
            ApiError::new(ApiErrorKind::NotFound(format!("Resource {}", url.path())))
        }
        StatusCode::UNPROCESSABLE_ENTITY => ApiError::new(ApiErrorKind::Validation(
            server_message.unwrap_or_else(|| "Validation failed".to_string()),
        )),
        s if s.is_server_error() => {
            let message = match s {
                StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT => format!("Gateway error ({})", code),
                _ => format!("Server error ({})", code),
            };
            ApiError::new(ApiErrorKind::Api(message))
                .with_status(code)
                .with_retryable(true)
        }
        _ => ApiError::new(ApiErrorKind::Api(
            server_message.unwrap_or_else(|| format!("Request failed (HTTP {})", code)),
        ))
        .with_status(code),
    };

    Outcome::Failure(error)
}
