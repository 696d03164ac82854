//! Unit tests for the resilient HTTP client

use super::*;
use crate::api::{FilePart, FormValue};
use portico_core::error::ErrorKind;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scripted transport that records every request it sees
struct MockTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportFailure>>>,
    fallback: Result<RawResponse, TransportFailure>,
    requests: Mutex<Vec<RawRequest>>,
}

impl MockTransport {
    fn always(result: Result<RawResponse, TransportFailure>) -> Arc<Self> {
        Self::scripted(Vec::new(), result)
    }

    fn scripted(
        script: Vec<Result<RawResponse, TransportFailure>>,
        fallback: Result<RawResponse, TransportFailure>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    fn last_request(&self) -> RawRequest {
        self.requests.lock().last().cloned().expect("no request recorded")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, TransportFailure> {
        self.requests.lock().push(request);
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

fn raw_response(status: u16, content_type: &str, body: &[u8]) -> RawResponse {
    RawResponse {
        status,
        status_text: "OK".to_string(),
        headers: vec![("Content-Type".to_string(), content_type.to_string())],
        body: body.to_vec(),
    }
}

fn json_ok(value: serde_json::Value) -> Result<RawResponse, TransportFailure> {
    Ok(raw_response(200, "application/json; charset=utf-8", value.to_string().as_bytes()))
}

fn client_with(config: ClientConfig, transport: Arc<MockTransport>) -> ResilientHttpClient {
    ResilientHttpClient::with_transport(config, transport)
}

#[tokio::test]
async fn test_json_response_is_normalized() {
    let transport = MockTransport::always(json_ok(serde_json::json!({ "games": ["snake"] })));
    let client = client_with(ClientConfig::default(), transport);

    let response = client.get("https://api.example.com/featured", RequestOptions::new()).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.ok);
    assert_eq!(response.data, ResponseBody::Json(serde_json::json!({ "games": ["snake"] })));
    assert_eq!(response.header("content-type"), Some("application/json; charset=utf-8"));
}

#[tokio::test]
async fn test_text_and_binary_responses() {
    let transport = MockTransport::scripted(
        vec![
            Ok(raw_response(200, "text/html", b"<h1>hi</h1>")),
            Ok(raw_response(200, "image/png", &[0x89, 0x50])),
        ],
        Err(TransportFailure::Timeout),
    );
    let client = client_with(ClientConfig::default(), transport);

    let html = client.get("/index", RequestOptions::new()).await.unwrap();
    assert_eq!(html.text(), Some("<h1>hi</h1>"));

    let image = client.get("/logo", RequestOptions::new()).await.unwrap();
    assert_eq!(image.data, ResponseBody::Bytes(vec![0x89, 0x50]));
}

#[tokio::test]
async fn test_invalid_json_is_decode_error() {
    let transport = MockTransport::always(Ok(raw_response(200, "application/json", b"{not json")));
    let client = client_with(ClientConfig::default(), transport);

    let err = client.get("/broken", RequestOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[tokio::test]
async fn test_cached_get_skips_transport() {
    let transport = MockTransport::always(json_ok(serde_json::json!({ "id": 1 })));
    let client = client_with(ClientConfig::default(), Arc::clone(&transport));

    let first = client.get("/categories", RequestOptions::new().cached()).await.unwrap();
    let second = client.get("/categories", RequestOptions::new().cached()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.cache_stats().fresh_entries, 1);
}

#[tokio::test]
async fn test_uncached_get_always_hits_transport() {
    let transport = MockTransport::always(json_ok(serde_json::json!({})));
    let client = client_with(ClientConfig::default(), Arc::clone(&transport));

    client.get("/search", RequestOptions::new()).await.unwrap();
    client.get("/search", RequestOptions::new()).await.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(client.cache_stats().total_entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_ttl_expiry_triggers_fresh_call() {
    let transport = MockTransport::always(json_ok(serde_json::json!({ "id": 1 })));
    let config = ClientConfig::default().with_cache_timeout(Duration::from_secs(60));
    let client = client_with(config, Arc::clone(&transport));

    client.get("/featured", RequestOptions::new().cached()).await.unwrap();

    tokio::time::advance(Duration::from_secs(59)).await;
    client.get("/featured", RequestOptions::new().cached()).await.unwrap();
    assert_eq!(transport.calls(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    client.get("/featured", RequestOptions::new().cached()).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_mutations_neither_read_nor_invalidate_cache() {
    let transport = MockTransport::always(json_ok(serde_json::json!({ "ok": true })));
    let client = client_with(ClientConfig::default(), Arc::clone(&transport));

    client.get("/7", RequestOptions::new().cached()).await.unwrap();
    client.post("/7", serde_json::json!({ "rating": 5 }), RequestOptions::new().cached()).await.unwrap();
    client.post("/7", serde_json::json!({ "rating": 5 }), RequestOptions::new().cached()).await.unwrap();
    client.get("/7", RequestOptions::new().cached()).await.unwrap();

    // One GET plus two POSTs; the second GET is still served from cache
    assert_eq!(transport.calls(), 3);
    assert_eq!(client.cache_stats().total_entries, 1);
}

#[tokio::test]
async fn test_header_precedence_and_bearer_token() {
    let transport = MockTransport::always(json_ok(serde_json::json!({})));
    let config = ClientConfig::default()
        .with_header("Content-Type", "application/json")
        .with_header("X-Service", "game-api")
        .with_token("initial");
    let client = client_with(config, Arc::clone(&transport));

    client
        .get("/featured", RequestOptions::new().header("x-service", "override"))
        .await
        .unwrap();
    let headers = transport.last_request().headers;
    assert_eq!(headers.get("x-service").map(String::as_str), Some("override"));
    assert!(!headers.contains_key("X-Service"));
    assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer initial"));

    client.set_auth_token("rotated");
    client.get("/featured", RequestOptions::new()).await.unwrap();
    let headers = transport.last_request().headers;
    assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer rotated"));

    client.clear_auth_token();
    client.get("/featured", RequestOptions::new()).await.unwrap();
    assert!(!transport.last_request().headers.contains_key("Authorization"));
    assert_eq!(client.auth_token(), None);
}

#[tokio::test(start_paused = true)]
async fn test_retry_then_fail_makes_exactly_three_attempts() {
    let transport = MockTransport::always(Err(TransportFailure::network("connection refused")));
    let retries = Arc::new(AtomicU32::new(0));
    let observed = Arc::clone(&retries);
    let client = client_with(ClientConfig::default().with_retry(2), Arc::clone(&transport))
        .with_retry_observer(Arc::new(move |event: &RetryEvent<'_>| {
            assert_eq!(event.limit, 2);
            observed.fetch_add(1, Ordering::SeqCst);
        }));

    let err = client.get("/featured", RequestOptions::new()).await.unwrap_err();

    assert_eq!(transport.calls(), 3);
    assert_eq!(retries.load(Ordering::SeqCst), 2);
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_status_recovers() {
    let transport = MockTransport::scripted(
        vec![
            Err(TransportFailure::status(503, "Service Unavailable")),
            Err(TransportFailure::Timeout),
        ],
        json_ok(serde_json::json!({ "recovered": true })),
    );
    let client = client_with(ClientConfig::default(), Arc::clone(&transport));

    let response = client.get("/featured", RequestOptions::new()).await.unwrap();
    assert_eq!(response.data, ResponseBody::Json(serde_json::json!({ "recovered": true })));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let transport = MockTransport::always(Err(TransportFailure::status(404, "Not Found")));
    let client = client_with(ClientConfig::default().with_retry(3), Arc::clone(&transport));

    let err = client.get("/missing", RequestOptions::new()).await.unwrap_err();
    assert_eq!(transport.calls(), 1);
    match err {
        PorticoError::HttpStatus { status, status_text, message } => {
            assert_eq!(status, 404);
            assert_eq!(status_text, "Not Found");
            assert_eq!(message, "HTTP error 404: Not Found");
        }
        other => panic!("Expected HttpStatus error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_translated() {
    let transport = MockTransport::always(Err(TransportFailure::Timeout));
    let config = ClientConfig::default().with_retry(1).with_timeout(Duration::from_secs(8));
    let client = client_with(config, Arc::clone(&transport));

    let err = client.get("https://api.example.com/slow", RequestOptions::new()).await.unwrap_err();
    assert_eq!(transport.calls(), 2);
    match err {
        PorticoError::RequestTimeout { method, url, timeout } => {
            assert_eq!(method, "GET");
            assert_eq!(url, "https://api.example.com/slow");
            assert_eq!(timeout, Duration::from_secs(8));
        }
        other => panic!("Expected RequestTimeout error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_per_call_timeout_is_forwarded() {
    let transport = MockTransport::always(json_ok(serde_json::json!({})));
    let client = client_with(ClientConfig::default(), Arc::clone(&transport));

    client.get("/x", RequestOptions::new().timeout(Duration::from_millis(250))).await.unwrap();
    assert_eq!(transport.last_request().timeout, Duration::from_millis(250));

    client.get("/x", RequestOptions::new()).await.unwrap();
    assert_eq!(transport.last_request().timeout, Duration::from_secs(10));
}

#[tokio::test]
async fn test_base_url_and_query_resolution() {
    let transport = MockTransport::always(json_ok(serde_json::json!({})));
    let config = ClientConfig::default().with_base_url("https://api.example.com/games/");
    let client = client_with(config, Arc::clone(&transport));

    client
        .get("/search", RequestOptions::new().query("q", "space invaders").query("page", "2"))
        .await
        .unwrap();
    assert_eq!(
        transport.last_request().url,
        "https://api.example.com/games/search?page=2&q=space+invaders"
    );

    client.get("https://cdn.example.com/logo.png", RequestOptions::new()).await.unwrap();
    assert_eq!(transport.last_request().url, "https://cdn.example.com/logo.png");
}

#[tokio::test]
async fn test_upload_single_file() {
    let transport = MockTransport::always(json_ok(serde_json::json!({ "uploaded": true })));
    let config = ClientConfig::default().with_header("Content-Type", "application/json");
    let client = client_with(config, Arc::clone(&transport));

    let file = FilePart::new("avatar.png", vec![1, 2, 3]);
    client
        .upload("/avatar", UploadPayload::File(file.clone()), RequestOptions::new())
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.body, RequestBody::Multipart(vec![("file".to_string(), FormValue::File(file))]));
    assert!(!request.headers.keys().any(|name| name.eq_ignore_ascii_case("content-type")));
}

#[tokio::test]
async fn test_upload_fields() {
    let transport = MockTransport::always(json_ok(serde_json::json!({})));
    let client = client_with(ClientConfig::default(), Arc::clone(&transport));

    let fields = BTreeMap::from([
        ("title".to_string(), FormValue::Text("Snake".to_string())),
        ("cover".to_string(), FormValue::File(FilePart::new("cover.jpg", vec![7]))),
    ]);
    client
        .upload("/games", UploadPayload::Fields(fields), RequestOptions::new())
        .await
        .unwrap();

    match transport.last_request().body {
        RequestBody::Multipart(parts) => {
            let names: Vec<&str> = parts.iter().map(|(name, _)| name.as_str()).collect();
            assert_eq!(names, vec!["cover", "title"]);
        }
        other => panic!("Expected multipart body, got {:?}", other),
    }
}

#[tokio::test]
async fn test_extend_does_not_mutate_original() {
    let transport = MockTransport::always(json_ok(serde_json::json!({})));
    let client = client_with(
        ClientConfig::default().with_base_url("https://api.example.com"),
        Arc::clone(&transport),
    );
    client.set_auth_token("live-token");
    client.get("/warm", RequestOptions::new().cached()).await.unwrap();

    let extended = client.extend(&ClientOverrides {
        base_url: Some("https://wallet.example.com".to_string()),
        retry: Some(0),
        ..Default::default()
    });

    assert_eq!(extended.config().base_url.as_deref(), Some("https://wallet.example.com"));
    assert_eq!(extended.config().retry, 0);
    assert_eq!(extended.auth_token().as_deref(), Some("live-token"));
    assert_eq!(extended.cache_stats().total_entries, 0);

    assert_eq!(client.config().base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(client.config().retry, 3);
    assert_eq!(client.cache_stats().total_entries, 1);
}

#[tokio::test]
async fn test_clear_cache() {
    let transport = MockTransport::always(json_ok(serde_json::json!({})));
    let client = client_with(ClientConfig::default(), Arc::clone(&transport));

    client.get("/a", RequestOptions::new().cached()).await.unwrap();
    client.clear_cache();
    client.get("/a", RequestOptions::new().cached()).await.unwrap();

    assert_eq!(transport.calls(), 2);
}

#[test]
fn test_resolve_url_without_base() {
    let query = BTreeMap::from([("a".to_string(), "1".to_string())]);
    assert_eq!(resolve_url(None, "/games?sort=new", &query), "/games?sort=new&a=1");
    assert_eq!(resolve_url(Some("/api/games"), "featured", &BTreeMap::new()), "/api/games/featured");
}

#[tokio::test]
async fn test_end_to_end_with_reqwest_transport() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/games/featured"))
        .and(query_param("limit", "3"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/games/featured"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "games": [1, 2, 3] })))
        .mount(&mock_server)
        .await;

    let config = ClientConfig::default()
        .with_base_url(format!("{}/api/games", mock_server.uri()))
        .with_token("secret")
        .with_backoff(crate::config::BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        });
    let client = ResilientHttpClient::new(config).unwrap();

    let response = client
        .get("/featured", RequestOptions::new().query("limit", "3").cached())
        .await
        .unwrap();
    assert_eq!(response.json::<serde_json::Value>().unwrap()["games"][2], 3);

    // Second call is served from cache
    client.get("/featured", RequestOptions::new().query("limit", "3").cached()).await.unwrap();
    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
}
