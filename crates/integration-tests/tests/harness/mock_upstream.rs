//! Mock upstream server for integration tests
//!
//! Serves chat-completion SSE, responses SSE and an OAuth token endpoint,
//! counting every request it sees.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Mock upstream that returns predictable streams
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    connections: AtomicU32,
    chat_count: AtomicU32,
    responses_count: AtomicU32,
    token_count: AtomicU32,
    /// Number of requests to fail before succeeding (0 = never fail)
    fail_count: AtomicU32,
    /// Last `Authorization` header seen on a streaming endpoint
    last_authorization: Mutex<Option<String>>,
    /// Last JSON body seen on a streaming endpoint
    last_body: Mutex<Option<Value>>,
}

impl MockUpstream {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0).await
    }

    /// Start a mock server that fails the first `n` streaming requests with 500
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(n).await
    }

    async fn start_inner(fail_count: u32) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            connections: AtomicU32::new(0),
            chat_count: AtomicU32::new(0),
            responses_count: AtomicU32::new(0),
            token_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            last_authorization: Mutex::new(None),
            last_body: Mutex::new(None),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/responses", routing::post(handle_responses))
            .route("/oauth/token", routing::post(handle_token))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as a chat-completions provider
    ///
    /// Includes `/v1` since the adapter appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Full URL of the responses endpoint
    pub fn responses_url(&self) -> String {
        format!("http://{}/v1/responses", self.addr)
    }

    /// Full URL of the OAuth token endpoint
    pub fn token_url(&self) -> String {
        format!("http://{}/oauth/token", self.addr)
    }

    /// Requests received on any route
    pub fn connection_count(&self) -> u32 {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Chat-completion requests received
    pub fn chat_count(&self) -> u32 {
        self.state.chat_count.load(Ordering::SeqCst)
    }

    /// Responses requests received
    pub fn responses_count(&self) -> u32 {
        self.state.responses_count.load(Ordering::SeqCst)
    }

    /// Token refresh requests received
    pub fn token_count(&self) -> u32 {
        self.state.token_count.load(Ordering::SeqCst)
    }

    /// `Authorization` header of the last streaming request
    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().unwrap().clone()
    }

    /// JSON body of the last streaming request
    pub fn last_body(&self) -> Option<Value> {
        self.state.last_body.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockState {
    fn record(&self, headers: &HeaderMap, body: &Value) {
        self.connections.fetch_add(1, Ordering::SeqCst);
        *self.last_authorization.lock().unwrap() = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        *self.last_body.lock().unwrap() = Some(body.clone());
    }

    /// Consume one scheduled failure, if any remain
    fn should_fail(&self) -> bool {
        self.fail_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": {
                "message": "mock server intentional failure",
                "type": "server_error"
            }
        })),
    )
        .into_response()
}

fn sse(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn chat_chunk(delta: &Value, finish_reason: Option<&str>) -> String {
    let chunk = json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "mock-model",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    });
    format!("data: {chunk}\n\n")
}

// -- Handlers --

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(&headers, &body);
    state.chat_count.fetch_add(1, Ordering::SeqCst);

    if state.should_fail() {
        return failure();
    }

    let has_tools = body["tools"].as_array().is_some_and(|tools| !tools.is_empty());
    let mut out = String::new();

    if has_tools {
        out.push_str(&chat_chunk(
            &json!({
                "role": "assistant",
                "tool_calls": [{
                    "index": 0,
                    "id": "call_mock",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": ""}
                }]
            }),
            None,
        ));
        out.push_str(&chat_chunk(
            &json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"location\":\"Paris\"}"}}]}),
            None,
        ));
        out.push_str(&chat_chunk(&json!({}), Some("tool_calls")));
    } else {
        out.push_str(&chat_chunk(&json!({"role": "assistant", "content": ""}), None));
        for word in ["Hello ", "from ", "mock ", "upstream"] {
            out.push_str(&chat_chunk(&json!({"content": word}), None));
        }
        out.push_str(&chat_chunk(&json!({}), Some("stop")));
    }

    let usage = json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "mock-model",
        "choices": [],
        "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
    });
    out.push_str(&format!("data: {usage}\n\n"));
    out.push_str("data: [DONE]\n\n");

    sse(out)
}

async fn handle_responses(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.record(&headers, &body);
    state.responses_count.fetch_add(1, Ordering::SeqCst);

    if state.should_fail() {
        return failure();
    }

    let events = [
        json!({"type": "response.created", "response": {}}),
        json!({"type": "response.output_text.delta", "delta": "Hello "}),
        json!({"type": "response.output_text.delta", "delta": "from responses"}),
        json!({
            "type": "response.completed",
            "response": {
                "usage": {
                    "input_tokens": 20,
                    "output_tokens": 3,
                    "input_tokens_details": {"cached_tokens": 5}
                }
            }
        }),
    ];

    let out = events
        .iter()
        .map(|event| format!("event: {}\ndata: {event}\n\n", event["type"].as_str().unwrap_or_default()))
        .collect();

    sse(out)
}

async fn handle_token(
    State(state): State<Arc<MockState>>,
    Form(form): Form<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.token_count.fetch_add(1, Ordering::SeqCst);

    if form.get("grant_type").map(String::as_str) != Some("refresh_token") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "unsupported_grant_type"})));
    }

    (
        StatusCode::OK,
        Json(json!({
            "access_token": "at-refreshed",
            "refresh_token": "rt-rotated"
        })),
    )
}
