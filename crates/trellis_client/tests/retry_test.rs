//! Tests for the retry policy as driven by the executor.

mod test_utils;

use reqwest::header::AUTHORIZATION;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{MockReply, MockTransport, RecordingHooks, client_with, fast_config};
use tokio::time::Instant;
use trellis_client::{
    CancellationToken, Client, ErrorCode, HttpOptions, RefreshableToken, StaticToken,
};

fn hooked_client(transport: Arc<MockTransport>, hooks: Arc<RecordingHooks>) -> Client {
    Client::builder(StaticToken::new("token"))
        .with_config(fast_config())
        .with_transport(transport)
        .with_hooks(hooks)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_get_retries_server_errors_then_succeeds() {
    let transport = MockTransport::new([
        MockReply::status(503),
        MockReply::status(502),
        MockReply::json(r#"{"id":1}"#),
    ]);
    let hooks = Arc::new(RecordingHooks::default());
    let client = hooked_client(transport.clone(), hooks.clone());

    let response = client
        .get("/projects/1.json", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(transport.call_count(), 3);
    assert_eq!(*hooks.starts.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(
        *hooks.retries.lock().unwrap(),
        vec![(2, Duration::from_millis(10)), (3, Duration::from_millis(20))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_get_budget_exhausted_surfaces_last_error() {
    let transport = MockTransport::new([
        MockReply::status(503),
        MockReply::status(502),
        MockReply::status(500),
    ]);
    let config = fast_config().with_http(HttpOptions {
        max_retries: 3,
        base_delay_ms: 10,
        max_jitter_ms: 0,
        ..Default::default()
    });
    let client = client_with(config, transport.clone(), StaticToken::new("token"));

    let err = client
        .get("/projects.json", &CancellationToken::new())
        .await
        .unwrap_err();

    let api = err.as_api().expect("api error");
    assert_eq!(api.status, Some(500));
    assert!(api.retryable);
    assert_eq!(err.code(), ErrorCode::Api);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_elapse() {
    let transport = MockTransport::new([
        MockReply::status(503),
        MockReply::status(503),
        MockReply::json("[]"),
    ]);
    let client = client_with(fast_config(), transport, StaticToken::new("token"));

    let start = Instant::now();
    client
        .get("/projects.json", &CancellationToken::new())
        .await
        .unwrap();

    // 10ms then 20ms, no jitter
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[tokio::test(start_paused = true)]
async fn test_network_errors_are_retried_for_reads() {
    let transport = MockTransport::new([MockReply::NetworkError, MockReply::json("[]")]);
    let client = client_with(fast_config(), transport.clone(), StaticToken::new("token"));

    client
        .get("/projects.json", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_statuses_are_not_retried() {
    for (status, code) in [
        (403, ErrorCode::Forbidden),
        (404, ErrorCode::NotFound),
        (422, ErrorCode::Validation),
    ] {
        let transport = MockTransport::new([MockReply::status(status)]);
        let client = client_with(fast_config(), transport.clone(), StaticToken::new("token"));

        let err = client
            .get("/projects/1.json", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), code, "status {}", status);
        assert_eq!(transport.call_count(), 1, "status {}", status);
    }
}

#[tokio::test(start_paused = true)]
async fn test_error_message_comes_from_body() {
    let transport =
        MockTransport::new([MockReply::status(422).body(r#"{"error":"Name can't be blank"}"#)]);
    let client = client_with(fast_config(), transport, StaticToken::new("token"));

    let err = client
        .post("/projects.json", &serde_json::json!({}), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Name can't be blank"));
}

#[tokio::test(start_paused = true)]
async fn test_mutation_not_retried_on_server_error() {
    let transport = MockTransport::new([MockReply::status(503), MockReply::json("{}")]);
    let client = client_with(fast_config(), transport.clone(), StaticToken::new("token"));

    let err = client
        .post(
            "/projects.json",
            &serde_json::json!({"name": "Launch"}),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let api = err.as_api().expect("api error");
    assert_eq!(api.status, Some(503));
    assert!(api.retryable);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_not_retried_on_rate_limit() {
    let transport = MockTransport::new([MockReply::status(429), MockReply::json("{}")]);
    let client = client_with(fast_config(), transport.clone(), StaticToken::new("token"));

    let err = client
        .delete("/projects/1.json", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::RateLimit);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_retried_once_after_refresh() {
    let transport = MockTransport::new([
        MockReply::status(401),
        MockReply::Respond {
            status: 201,
            headers: Vec::new(),
            body: br#"{"id":5}"#.to_vec(),
        },
    ]);
    let hooks = Arc::new(RecordingHooks::default());
    let client = Client::builder(RefreshableToken::new("old", || Some("new".to_string())))
        .with_config(fast_config())
        .with_transport(transport.clone())
        .with_hooks(hooks.clone())
        .build()
        .unwrap();

    let response = client
        .post(
            "/projects.json",
            &serde_json::json!({"name": "Launch"}),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 201);
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].headers[AUTHORIZATION], "Bearer old");
    assert_eq!(requests[1].headers[AUTHORIZATION], "Bearer new");
    assert_eq!(requests[0].body, requests[1].body);
    assert_eq!(*hooks.retries.lock().unwrap(), vec![(2, Duration::ZERO)]);
}

#[tokio::test(start_paused = true)]
async fn test_second_unauthorized_is_terminal() {
    let transport = MockTransport::new([MockReply::status(401), MockReply::status(401)]);
    let client = client_with(
        fast_config(),
        transport.clone(),
        RefreshableToken::new("old", || Some("new".to_string())),
    );

    let err = client
        .put("/projects/1.json", &serde_json::json!({}), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Auth);
    assert!(!err.as_api().unwrap().retryable);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_read_refreshes_once() {
    let transport = MockTransport::new([MockReply::status(401)]);
    let client = client_with(
        fast_config(),
        transport.clone(),
        RefreshableToken::new("old", || Some("new".to_string())),
    );

    let err = client
        .get("/projects.json", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Auth);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unrefreshable_unauthorized_is_terminal() {
    let transport = MockTransport::new([MockReply::status(401), MockReply::json("{}")]);
    let client = client_with(fast_config(), transport.clone(), StaticToken::new("token"));

    let err = client
        .post("/projects.json", &serde_json::json!({}), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Auth);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_wait_replaces_backoff() {
    let transport = MockTransport::new([
        MockReply::status(429).header("retry-after", "2"),
        MockReply::json("[]"),
    ]);
    let hooks = Arc::new(RecordingHooks::default());
    let client = hooked_client(transport.clone(), hooks.clone());

    let start = Instant::now();
    client
        .get("/projects.json", &CancellationToken::new())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(*hooks.retries.lock().unwrap(), vec![(2, Duration::from_secs(2))]);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let transport = MockTransport::new([MockReply::status(503)]);
    let config = fast_config().with_http(HttpOptions {
        base_delay_ms: 60_000,
        max_jitter_ms: 0,
        ..Default::default()
    });
    let client = client_with(config, transport.clone(), StaticToken::new("token"));

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let err = client.get("/projects.json", &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(err.as_api().is_none());
    assert!(start.elapsed() < Duration::from_secs(60));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_in_flight() {
    let transport = MockTransport::new([MockReply::Hang]);
    let client = client_with(fast_config(), transport, StaticToken::new("token"));

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let err = client
        .post("/projects.json", &serde_json::json!({}), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_transport_times_out_and_retries() {
    let transport = MockTransport::new([MockReply::Hang]);
    let config = fast_config().with_http(HttpOptions {
        timeout_ms: 50,
        max_retries: 2,
        base_delay_ms: 10,
        max_jitter_ms: 0,
        ..Default::default()
    });
    let client = client_with(config, transport.clone(), StaticToken::new("token"));

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        client.get("/projects.json", &CancellationToken::new()),
    )
    .await
    .expect("call outlived the configured timeout");

    let err = outcome.unwrap_err();
    let api = err.as_api().expect("api error");
    assert_eq!(err.code(), ErrorCode::Network);
    assert!(api.retryable);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_already_cancelled_sends_nothing() {
    let transport = MockTransport::new([MockReply::json("[]")]);
    let client = client_with(fast_config(), transport.clone(), StaticToken::new("token"));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.get("/projects.json", &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_insecure_url_is_usage_error() {
    let transport = MockTransport::new([MockReply::json("[]")]);
    let client = client_with(fast_config(), transport.clone(), StaticToken::new("token"));

    let err = client
        .get("http://api.example.com/projects.json", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Usage);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_no_content_is_null() {
    let transport = MockTransport::new([MockReply::status(204)]);
    let client = client_with(fast_config(), transport, StaticToken::new("token"));

    let response = client
        .delete("/projects/1.json", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.json::<serde_json::Value>().unwrap(), serde_json::Value::Null);
}

#[tokio::test]
async fn test_standard_headers_are_sent() {
    let transport = MockTransport::new([MockReply::json("[]")]);
    let client = client_with(fast_config(), transport.clone(), StaticToken::new("secret"));

    client
        .get("/projects.json", &CancellationToken::new())
        .await
        .unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.url.as_str(), "https://api.example.com/projects.json");
    assert_eq!(request.headers[AUTHORIZATION], "Bearer secret");
    assert_eq!(request.headers["accept"], "application/json");
    assert!(
        request.headers["user-agent"]
            .to_str()
            .unwrap()
            .starts_with("trellis-rs/")
    );
}
