//! Canonical request to an agent prompt, and agent notifications to native events
//!
//! The agent runs its own tools. Its tool activity is surfaced to the client
//! as inert HTML-comment markers inside the text stream rather than as
//! `tool_use` blocks, since the client must not try to execute them.

use std::collections::HashMap;

use rand::Rng;
use serde_json::{Value, json};

use crate::protocol::agent::{DeltaParams, ErrorParams, ItemParams, RpcMessage, ThreadItem, TokenUsageParams};
use crate::types::{CanonicalRequest, NativeEvent, Usage};

const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Render the conversation as `Role: text` paragraphs
pub fn compose_prompt(request: &CanonicalRequest) -> String {
    request
        .messages
        .iter()
        .filter_map(|message| {
            let text = message.joined_text();
            (!text.is_empty()).then(|| format!("{}: {text}", message.role.label()))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// What a single agent message means for the stream
#[derive(Debug, PartialEq)]
pub enum AgentStep {
    Emit(Vec<NativeEvent>),
    TurnCompleted,
    /// A request was answered with a JSON-RPC error
    Failed(String),
}

/// Maps turn notifications onto native events
///
/// Tool ids are minted locally as `<kind>_<n>_<random>` and remembered
/// between `item/started` and `item/completed`.
#[derive(Debug, Default)]
pub struct NotificationMapper {
    counter: u32,
    active: HashMap<String, String>,
}

impl NotificationMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, message: &RpcMessage) -> AgentStep {
        if let (Some(_), Some(error)) = (&message.id, &message.error) {
            let reason = if error.message.is_empty() { "unknown error" } else { &error.message };
            return AgentStep::Failed(format!("agent rejected request: {reason}"));
        }

        let params = message.params.clone();

        let events = match message.method() {
            "item/agentMessage/delta" => delta(params).map(NativeEvent::text).into_iter().collect(),
            "item/reasoning/summaryTextDelta" => delta(params).map(NativeEvent::reasoning).into_iter().collect(),
            "item/started" => match serde_json::from_value::<ItemParams>(params) {
                Ok(ItemParams { item }) => self.started(item),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed item/started");
                    Vec::new()
                }
            },
            "item/completed" => match serde_json::from_value::<ItemParams>(params) {
                Ok(ItemParams { item }) => self.completed(item),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed item/completed");
                    Vec::new()
                }
            },
            "thread/tokenUsage/updated" => {
                let usage = serde_json::from_value::<TokenUsageParams>(params)
                    .unwrap_or_default()
                    .token_usage;

                vec![NativeEvent::UsageUpdate(Usage {
                    cache_read_input_tokens: usage.cached_input_tokens,
                    ..Usage::new(usage.input_tokens, usage.output_tokens)
                })]
            }
            "error" => {
                let message = serde_json::from_value::<ErrorParams>(params)
                    .map(|params| params.error.message)
                    .ok()
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_owned());

                vec![NativeEvent::StreamError { message }]
            }
            "turn/completed" => return AgentStep::TurnCompleted,
            other => {
                tracing::trace!(method = other, "ignoring agent notification");
                Vec::new()
            }
        };

        AgentStep::Emit(events)
    }

    fn started(&mut self, item: ThreadItem) -> Vec<NativeEvent> {
        match item {
            ThreadItem::CommandExecution { id, command, .. } => {
                let tool_id = self.register(id, "codex_cmd");
                vec![start_marker(&tool_id, "CodexCommand", json!({"command": command}))]
            }
            ThreadItem::FileChange { id, changes } => changes
                .iter()
                .map(|change| {
                    let tool_id = self.register(format!("{id}:{}", change.path), "codex_file");
                    let name = if change.is_add() { "Write" } else { "Edit" };
                    start_marker(&tool_id, name, json!({"file_path": change.path}))
                })
                .collect(),
            ThreadItem::McpToolCall {
                id, tool, arguments, ..
            } => {
                let tool_id = self.register(id, "codex_mcp");
                let name = if tool.is_empty() { "mcp_tool" } else { tool.as_str() };
                let input = if arguments.is_object() { arguments } else { json!({}) };
                vec![start_marker(&tool_id, name, input)]
            }
            ThreadItem::WebSearch { id, query } => {
                let tool_id = self.register(id, "codex_search");
                vec![start_marker(&tool_id, "WebSearch", json!({"query": query}))]
            }
            ThreadItem::Other => Vec::new(),
        }
    }

    /// Completions for items never seen starting are dropped
    fn completed(&mut self, item: ThreadItem) -> Vec<NativeEvent> {
        match item {
            ThreadItem::CommandExecution {
                id,
                aggregated_output,
                exit_code,
                ..
            } => self
                .active
                .remove(&id)
                .map(|tool_id| {
                    result_marker(&json!({
                        "id": tool_id,
                        "output": aggregated_output.unwrap_or_default(),
                        "exit_code": exit_code.unwrap_or(0),
                    }))
                })
                .into_iter()
                .collect(),
            ThreadItem::FileChange { id, changes } => changes
                .iter()
                .filter_map(|change| self.active.remove(&format!("{id}:{}", change.path)))
                .map(|tool_id| result_marker(&json!({"id": tool_id})))
                .collect(),
            ThreadItem::McpToolCall { id, result, .. } => self
                .active
                .remove(&id)
                .map(|tool_id| {
                    let output = result
                        .as_ref()
                        .and_then(|result| result.get("content"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    result_marker(&json!({"id": tool_id, "output": output}))
                })
                .into_iter()
                .collect(),
            ThreadItem::WebSearch { id, .. } => self
                .active
                .remove(&id)
                .map(|tool_id| result_marker(&json!({"id": tool_id, "output": "search completed"})))
                .into_iter()
                .collect(),
            ThreadItem::Other => Vec::new(),
        }
    }

    fn register(&mut self, key: String, prefix: &str) -> String {
        self.counter += 1;
        let tool_id = format!("{prefix}_{}_{}", self.counter, random_suffix());
        self.active.insert(key, tool_id.clone());
        tool_id
    }
}

fn delta(params: Value) -> Option<String> {
    serde_json::from_value::<DeltaParams>(params)
        .ok()
        .map(|params| params.delta)
        .filter(|delta| !delta.is_empty())
}

fn start_marker(tool_id: &str, name: &str, input: Value) -> NativeEvent {
    let payload = json!({"id": tool_id, "name": name, "input": input});
    NativeEvent::text(format!("<!--CODEX_TOOL_START:{payload}-->"))
}

fn result_marker(payload: &Value) -> NativeEvent {
    NativeEvent::text(format!("<!--CODEX_TOOL_RESULT:{payload}-->"))
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..12)
        .map(|_| char::from(ID_CHARSET[rng.random_range(0..ID_CHARSET.len())]))
        .collect()
}
