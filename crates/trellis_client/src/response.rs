//! Successful responses handed back to callers.

use crate::pagination::{ListMeta, parse_next_link};
use derive_getters::Getters;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use trellis_error::JsonError;

/// Header carrying the total size of a paged collection.
pub const TOTAL_COUNT: &str = "x-total-count";

/// A successful response.
///
/// A `304` served from the cache reports status `200` with
/// `from_cache == true`.
#[derive(Debug, Clone, Getters)]
pub struct Response {
    /// HTTP status
    status: StatusCode,
    /// Response headers
    headers: HeaderMap,
    /// Raw body; JSON `null` for `204`
    body: Vec<u8>,
    /// URL the response was fetched from
    url: Url,
    /// Whether the body came from the conditional cache
    from_cache: bool,
}

impl Response {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
        url: Url,
        from_cache: bool,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            url,
            from_cache,
        }
    }

    /// Decode the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, JsonError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| JsonError::new(format!("Failed to parse response: {}", e)))
    }

    /// Decode the body as a JSON array of raw items.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON array.
    pub fn items(&self) -> Result<Vec<JsonValue>, JsonError> {
        self.json()
    }

    /// Continuation target from the `Link` header, as sent by the server.
    pub fn next_link(&self) -> Option<String> {
        let header = self.headers.get(LINK)?.to_str().ok()?;
        parse_next_link(header)
    }

    /// Collection metadata from the headers.
    pub fn meta(&self) -> ListMeta {
        let total_count = self
            .headers
            .get(TOTAL_COUNT)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        ListMeta::new(total_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response(headers: HeaderMap, body: &[u8]) -> Response {
        Response::new(
            StatusCode::OK,
            headers,
            body.to_vec(),
            Url::parse("https://api.example.com/1/todos.json").unwrap(),
            false,
        )
    }

    #[test]
    fn test_items_and_meta() {
        let mut headers = HeaderMap::new();
        headers.insert(TOTAL_COUNT, HeaderValue::from_static("42"));
        headers.insert(
            LINK,
            HeaderValue::from_static(r#"<https://api.example.com/1/todos.json?page=2>; rel="next""#),
        );
        let resp = response(headers, br#"[{"id":1},{"id":2}]"#);

        assert_eq!(resp.items().unwrap().len(), 2);
        assert_eq!(*resp.meta().total_count(), 42);
        assert_eq!(
            resp.next_link().as_deref(),
            Some("https://api.example.com/1/todos.json?page=2")
        );
    }

    #[test]
    fn test_missing_or_bad_total_count_is_zero() {
        assert_eq!(*response(HeaderMap::new(), b"[]").meta().total_count(), 0);

        let mut headers = HeaderMap::new();
        headers.insert(TOTAL_COUNT, HeaderValue::from_static("many"));
        assert_eq!(*response(headers, b"[]").meta().total_count(), 0);
    }

    #[test]
    fn test_items_rejects_object() {
        assert!(response(HeaderMap::new(), br#"{"id":1}"#).items().is_err());
    }
}
