use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method as HttpMethod, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use campaign_http::{CallDescriptor, Cause, Config, Method, RequestExecutor, RetryPolicy};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    retry_after: Option<&'static str>,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            retry_after: None,
            delay: Duration::from_millis(0),
        }
    }

    fn with_retry_after(mut self, seconds: &'static str) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct SeenRequest {
    method: HttpMethod,
    path: String,
    query: HashMap<String, String>,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    hits: Arc<AtomicUsize>,
}

async fn api_handler(
    State(state): State<MockState>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let header_text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    let query = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();
    state
        .seen
        .lock()
        .expect("seen mutex must not be poisoned")
        .push(SeenRequest {
            method,
            path: uri.path().to_owned(),
            query,
            authorization: header_text(header::AUTHORIZATION),
            content_type: header_text(header::CONTENT_TYPE),
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let mut http_response = (response.status, Json(response.body)).into_response();
    if let Some(seconds) = response.retry_after {
        http_response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static(seconds));
    }
    http_response
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn api_url(&self) -> String {
        format!("{}/api/v2", self.base_url)
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen mutex must not be poisoned").clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        seen: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .fallback(api_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        seen: state.seen,
        task,
    }
}

fn executor_for(base_url: &str, policy: RetryPolicy) -> RequestExecutor {
    let config = Config::new("token")
        .with_base_url(base_url)
        .with_retry_policy(policy)
        .with_timeout_ms(1_000);
    RequestExecutor::new(&config)
}

fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, 1, 5, 2.0).expect("policy must be valid")
}

#[tokio::test]
async fn get_sends_payload_as_query_with_bearer_header() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!([{ "id": 1, "email": "kit@example.com" }]),
    )])
    .await;
    let executor = executor_for(&server.api_url(), quick_policy(1));
    let descriptor = CallDescriptor::new(
        Method::Get,
        "/subscribers",
        Some(json!({"limit": 10, "type": "active"})),
    )
    .expect("descriptor must be valid");

    let body = executor
        .execute(&descriptor)
        .await
        .expect("request must succeed");

    assert_eq!(body, json!([{ "id": 1, "email": "kit@example.com" }]));
    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.method, HttpMethod::GET);
    assert_eq!(request.path, "/api/v2/subscribers");
    assert_eq!(request.query.get("limit").map(String::as_str), Some("10"));
    assert_eq!(request.query.get("type").map(String::as_str), Some("active"));
    assert_eq!(request.authorization.as_deref(), Some("Bearer token"));
    assert_eq!(request.content_type.as_deref(), Some("application/json"));
    assert!(request.body.is_empty());
}

#[tokio::test]
async fn post_sends_payload_as_json_body() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::CREATED,
        json!({"id": 77, "name": "Newsletter"}),
    )])
    .await;
    let executor = executor_for(&server.api_url(), quick_policy(1));
    let descriptor = CallDescriptor::post("/groups", json!({"name": "Newsletter"}))
        .expect("descriptor must be valid");

    let body = executor
        .execute(&descriptor)
        .await
        .expect("request must succeed");

    assert_eq!(body["id"], json!(77));
    let seen = server.seen();
    assert_eq!(seen[0].method, HttpMethod::POST);
    assert!(seen[0].query.is_empty());
    let sent: JsonValue = serde_json::from_str(&seen[0].body).expect("body must be JSON");
    assert_eq!(sent, json!({"name": "Newsletter"}));
}

#[tokio::test]
async fn retries_server_error_then_succeeds() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})),
        MockResponse::json(StatusCode::OK, json!({"ok": true})),
    ])
    .await;
    let executor = executor_for(&server.api_url(), quick_policy(3));

    let body = executor
        .execute(&CallDescriptor::get("/me").expect("descriptor must be valid"))
        .await
        .expect("request must succeed after retry");

    assert_eq!(body, json!({"ok": true}));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_server_errors_report_body_error_field() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::BAD_GATEWAY, json!({"error": "upstream down"})),
        MockResponse::json(StatusCode::BAD_GATEWAY, json!({"error": "upstream down"})),
    ])
    .await;
    let executor = executor_for(&server.api_url(), quick_policy(2));

    let err = executor
        .execute(&CallDescriptor::get("/campaigns").expect("descriptor must be valid"))
        .await
        .expect_err("request must fail");

    assert_eq!(err.attempts(), 2);
    assert_eq!(
        err.message(),
        "request to /campaigns failed after 2 attempt(s): HTTP 502: upstream down"
    );
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limit_header_is_read_from_response() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::TOO_MANY_REQUESTS, json!({"message": "slow down"}))
            .with_retry_after("1"),
        MockResponse::json(StatusCode::OK, json!({"ok": true})),
    ])
    .await;
    let executor = executor_for(&server.api_url(), quick_policy(2));
    let started = Instant::now();

    executor
        .execute(&CallDescriptor::get("/stats").expect("descriptor must be valid"))
        .await
        .expect("request must succeed after waiting");

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"error": "Not found"}),
    )])
    .await;
    let executor = executor_for(&server.api_url(), quick_policy(3));

    let err = executor
        .execute(&CallDescriptor::delete("/webhooks/9").expect("descriptor must be valid"))
        .await
        .expect_err("request must fail");

    assert_eq!(err.to_string(), "endpoint not found: /webhooks/9");
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_timeout_is_retried_then_reported() {
    let slow = MockResponse::json(StatusCode::OK, json!({"ok": true}))
        .with_delay(Duration::from_millis(300));
    let server = spawn_server(vec![slow.clone(), slow]).await;
    let config = Config::new("token")
        .with_base_url(server.api_url())
        .with_retry_policy(quick_policy(2))
        .with_timeout_ms(20);
    let executor = RequestExecutor::new(&config);

    let err = executor
        .execute(&CallDescriptor::get("/slow").expect("descriptor must be valid"))
        .await
        .expect_err("request must time out");

    assert_eq!(err.attempts(), 2);
    assert!(matches!(err.cause(), Cause::Transport(_)));
}

#[tokio::test]
async fn unreachable_host_surfaces_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);
    let executor = executor_for(&format!("http://{address}/api/v2"), quick_policy(2));

    let err = executor
        .execute(&CallDescriptor::get("/me").expect("descriptor must be valid"))
        .await
        .expect_err("request must fail");

    assert_eq!(err.attempts(), 2);
    assert!(matches!(err.cause(), Cause::Transport(_)));
    assert!(err.message().starts_with("request to /me failed after 2 attempt(s): "));
}
