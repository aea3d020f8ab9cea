//! Axum route handlers for the Anthropic-compatible endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use conduit_config::LlmConfig;
use conduit_core::HttpError;
use futures_util::StreamExt;

use crate::dispatch::ProviderDispatcher;
use crate::envelope::{OpenFuture, envelope};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicRequest, CountTokensResponse};
use crate::tokens::estimate_tokens;
use crate::types::CanonicalRequest;

/// Shared state for LLM route handlers
#[derive(Clone)]
pub struct LlmState {
    inner: Arc<LlmStateInner>,
}

struct LlmStateInner {
    dispatcher: ProviderDispatcher,
}

impl LlmState {
    /// Build providers and credential sources from configuration
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        Ok(Self {
            inner: Arc::new(LlmStateInner {
                dispatcher: ProviderDispatcher::from_config(config)?,
            }),
        })
    }

    pub fn dispatcher(&self) -> &ProviderDispatcher {
        &self.inner.dispatcher
    }
}

/// Build the LLM router with all endpoints
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route("/v1/messages", routing::post(messages))
        .route("/v1/messages/count_tokens", routing::post(count_tokens))
        .with_state(state)
}

/// Handle `POST /v1/messages`
///
/// Always answers with an SSE stream once a provider is selected; failures
/// after that point are reported inside the stream.
async fn messages(State(state): State<LlmState>, Json(wire_request): Json<AnthropicRequest>) -> Response {
    let request = match CanonicalRequest::try_from(wire_request) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    let entry = match state.dispatcher().select(&request.model_id) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e),
    };

    tracing::info!(
        model_id = %request.model_id,
        provider = %entry.provider,
        messages = request.messages.len(),
        tools = request.tools.len(),
        "streaming messages request"
    );

    let model = request.model_id.clone();
    let open: OpenFuture = Box::pin(async move { entry.open(&request).await });

    let events = envelope(model, open).map(|event| Event::default().event(event.event_type()).json_data(&event));

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

/// Handle `POST /v1/messages/count_tokens`
async fn count_tokens(Json(body): Json<serde_json::Value>) -> Json<CountTokensResponse> {
    Json(CountTokensResponse {
        input_tokens: estimate_tokens(&body.to_string()),
    })
}

/// Convert an LLM error to an Anthropic-style JSON error response
fn error_response(error: &LlmError) -> Response {
    let status = error.status_code();

    if status.is_server_error() {
        tracing::error!(error = %error, "request failed");
    } else {
        tracing::warn!(error = %error, "request rejected");
    }

    let body = serde_json::json!({
        "type": "error",
        "error": {
            "type": error.error_type(),
            "message": error.client_message(),
        }
    });

    (status, Json(body)).into_response()
}
