//! JSON-RPC session over an agent process

use std::time::Duration;

use serde_json::{Value, json};

use super::transport::AgentProcess;
use crate::error::LlmError;
use crate::protocol::agent::{RpcMessage, RpcOutbound};

const CLIENT_NAME: &str = "conduit";

pub(super) struct AgentSession {
    process: AgentProcess,
    next_id: u64,
    idle_timeout: Duration,
}

impl AgentSession {
    pub(super) const fn new(process: AgentProcess, idle_timeout: Duration) -> Self {
        Self {
            process,
            next_id: 0,
            idle_timeout,
        }
    }

    /// Run the handshake up to a started thread and return its id
    pub(super) async fn start_thread(&mut self, thread_params: Value) -> Result<String, LlmError> {
        self.request(
            "initialize",
            json!({"clientInfo": {"name": CLIENT_NAME, "version": env!("CARGO_PKG_VERSION")}}),
        )
        .await?;
        self.notify("initialized", json!({})).await?;

        let result = self.request("thread/start", thread_params).await?;
        let thread_id = result
            .pointer("/thread/id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| LlmError::Subprocess(format!("thread/start returned no thread id: {result}")))?
            .to_owned();

        self.wait_for("thread/started").await?;

        Ok(thread_id)
    }

    /// Send a request and wait for its response, discarding anything else
    pub(super) async fn request(&mut self, method: &str, params: Value) -> Result<Value, LlmError> {
        let id = self.send_request(method, params).await?;

        loop {
            let message = self.next_message().await?;

            if !message.answers(id) {
                tracing::trace!(method = message.method(), "discarding message while awaiting response");
                continue;
            }

            if let Some(error) = message.error {
                return Err(LlmError::Subprocess(format!("{method} failed: {}", error.message)));
            }

            return Ok(message.result.unwrap_or(Value::Null));
        }
    }

    /// Send a request without waiting for its response
    pub(super) async fn send_request(&mut self, method: &str, params: Value) -> Result<u64, LlmError> {
        self.next_id += 1;
        let id = self.next_id;
        self.send(&RpcOutbound {
            method,
            id: Some(id),
            params,
        })
        .await?;
        Ok(id)
    }

    pub(super) async fn notify(&mut self, method: &str, params: Value) -> Result<(), LlmError> {
        self.send(&RpcOutbound { method, id: None, params }).await
    }

    /// Read until a notification with `method` arrives
    pub(super) async fn wait_for(&mut self, method: &str) -> Result<RpcMessage, LlmError> {
        loop {
            let message = self.next_message().await?;
            if message.method() == method {
                return Ok(message);
            }
        }
    }

    /// Next well-formed message, bounded by the idle timeout
    pub(super) async fn next_message(&mut self) -> Result<RpcMessage, LlmError> {
        loop {
            let line = tokio::time::timeout(self.idle_timeout, self.process.next_line())
                .await
                .map_err(|_| {
                    tracing::warn!(pid = ?self.process.id(), timeout = ?self.idle_timeout, "agent went idle");
                    LlmError::IdleTimeout(self.idle_timeout)
                })?
                .ok_or_else(|| LlmError::Subprocess("agent exited before completing the turn".to_owned()))?;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<RpcMessage>(&line) {
                Ok(message) => return Ok(message),
                Err(e) => {
                    tracing::debug!(error = %e, line = %String::from_utf8_lossy(&line), "skipping unparseable agent line");
                }
            }
        }
    }

    pub(super) async fn shutdown(&mut self) {
        self.process.shutdown().await;
    }

    async fn send(&mut self, message: &RpcOutbound<'_>) -> Result<(), LlmError> {
        let line = serde_json::to_vec(message).map_err(|e| LlmError::Internal(e.into()))?;

        self.process
            .write_line(&line)
            .await
            .map_err(|e| LlmError::Subprocess(format!("failed to write {}: {e}", message.method)))
    }
}
