//! Line-delimited JSON-RPC spoken by the agent subprocess
//!
//! Framing is one JSON object per line. Requests carry an integer `id`;
//! notifications carry only `method` and `params`. There is no `jsonrpc`
//! version member.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound request or notification
#[derive(Debug, Serialize)]
pub struct RpcOutbound<'a> {
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub params: Value,
}

/// Inbound response or notification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcMessage {
    /// Whether this is the response to request `id`
    pub fn answers(&self, id: u64) -> bool {
        self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub message: String,
}

// -- Notification payloads --

/// `item/agentMessage/delta` and `item/reasoning/summaryTextDelta`
#[derive(Debug, Default, Deserialize)]
pub struct DeltaParams {
    #[serde(default)]
    pub delta: String,
}

/// `item/started` and `item/completed`
#[derive(Debug, Deserialize)]
pub struct ItemParams {
    pub item: ThreadItem,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ThreadItem {
    #[serde(rename_all = "camelCase")]
    CommandExecution {
        #[serde(default)]
        id: String,
        #[serde(default)]
        command: Value,
        #[serde(default)]
        aggregated_output: Option<String>,
        #[serde(default)]
        exit_code: Option<i64>,
    },
    FileChange {
        #[serde(default)]
        id: String,
        #[serde(default)]
        changes: Vec<FileChangeEntry>,
    },
    McpToolCall {
        #[serde(default)]
        id: String,
        #[serde(default)]
        tool: String,
        #[serde(default)]
        arguments: Value,
        #[serde(default)]
        result: Option<Value>,
    },
    WebSearch {
        #[serde(default)]
        id: String,
        #[serde(default)]
        query: String,
    },
    /// Agent messages, reasoning items and anything newer
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct FileChangeEntry {
    #[serde(default)]
    pub path: String,
    /// `add`, `update`, `delete`; some agent versions send an object
    #[serde(default)]
    pub kind: Value,
}

impl FileChangeEntry {
    pub fn is_add(&self) -> bool {
        match &self.kind {
            Value::String(kind) => kind == "add",
            Value::Object(kind) => kind.get("type").and_then(Value::as_str) == Some("add"),
            _ => false,
        }
    }
}

/// `thread/tokenUsage/updated`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageParams {
    #[serde(default)]
    pub token_usage: TokenUsage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cached_input_tokens: u32,
}

/// `error`
#[derive(Debug, Default, Deserialize)]
pub struct ErrorParams {
    #[serde(default)]
    pub error: RpcError,
}
