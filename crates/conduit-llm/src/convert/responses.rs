//! Canonical request to the responses format, and named events to native events

use std::collections::HashMap;

use crate::effort::ReasoningEffort;
use crate::error::LlmError;
use crate::protocol::responses::{
    ResponsesFunctionItem, ResponsesInputItem, ResponsesOutputItem, ResponsesReasoning, ResponsesRequest,
    ResponsesStreamEvent, ResponsesTool,
};
use crate::types::{CanonicalRequest, ContentBlock, NativeEvent, ToolChoice, Usage};

/// Instructions sent when the client supplied no system prompt
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";

/// Build the upstream request body for `model`
pub fn build_request(
    request: &CanonicalRequest,
    model: &str,
    effort: Option<ReasoningEffort>,
    store: Option<bool>,
) -> ResponsesRequest {
    ResponsesRequest {
        model: model.to_owned(),
        instructions: request
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_owned()),
        input: input_items(request),
        stream: true,
        store,
        temperature: request.temperature,
        tools: request
            .tools
            .iter()
            .map(|tool| ResponsesTool {
                tool_type: "function",
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                parameters: tool.input_schema.clone(),
            })
            .collect(),
        tool_choice: request.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => serde_json::json!("auto"),
            ToolChoice::Any => serde_json::json!("required"),
            ToolChoice::None => serde_json::json!("none"),
            ToolChoice::Tool { name } => serde_json::json!({"type": "function", "name": name}),
        }),
        reasoning: effort.map(|effort| ResponsesReasoning {
            effort: effort.to_string(),
            summary: "auto",
        }),
    }
}

/// Flatten messages into input items, keeping text and tool traffic in order
fn input_items(request: &CanonicalRequest) -> Vec<ResponsesInputItem> {
    let mut items = Vec::new();

    for message in &request.messages {
        let role = message.role.as_str();
        let mut pending: Vec<&str> = Vec::new();

        let flush = |pending: &mut Vec<&str>, items: &mut Vec<ResponsesInputItem>| {
            if !pending.is_empty() {
                items.push(ResponsesInputItem::Message {
                    role: role.to_owned(),
                    content: pending.join("\n"),
                });
                pending.clear();
            }
        };

        for block in &message.content {
            match block {
                ContentBlock::Text { text } => pending.push(text),
                ContentBlock::ToolUse { id, name, input } => {
                    flush(&mut pending, &mut items);
                    items.push(ResponsesInputItem::Function(ResponsesFunctionItem::FunctionCall {
                        call_id: id.clone(),
                        name: name.clone(),
                        arguments: input.to_string(),
                    }));
                }
                ContentBlock::ToolResult {
                    tool_use_id, content, ..
                } => {
                    flush(&mut pending, &mut items);
                    items.push(ResponsesInputItem::Function(ResponsesFunctionItem::FunctionCallOutput {
                        call_id: tool_use_id.clone(),
                        output: content.clone(),
                    }));
                }
                ContentBlock::Thinking { .. } => {}
            }
        }

        flush(&mut pending, &mut items);
    }

    items
}

/// Stateful decoder for one responses stream
#[derive(Debug, Default)]
pub struct ResponsesDecoder {
    /// Function calls keyed by output item id
    calls: HashMap<String, FunctionCallState>,
}

#[derive(Debug)]
struct FunctionCallState {
    call_id: String,
    args_seen: bool,
    closed: bool,
}

impl ResponsesDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one event; `StreamDone` marks the end of the response
    pub fn decode(&mut self, event: &ResponsesStreamEvent) -> Result<Vec<NativeEvent>, LlmError> {
        self.decode_as(&event.event_type, event)
    }

    /// Translate one event named by its SSE `event:` line
    ///
    /// The line name wins over the payload `type`; an unnamed frame
    /// (`message` is the SSE default) falls back to `type`.
    pub fn decode_named(&mut self, name: &str, event: &ResponsesStreamEvent) -> Result<Vec<NativeEvent>, LlmError> {
        match name {
            "" | "message" => self.decode_as(&event.event_type, event),
            name => self.decode_as(name, event),
        }
    }

    fn decode_as(&mut self, kind: &str, event: &ResponsesStreamEvent) -> Result<Vec<NativeEvent>, LlmError> {
        let delta = event.delta.as_deref().filter(|d| !d.is_empty());

        let events = match kind {
            "response.output_text.delta" => delta.map(NativeEvent::text).into_iter().collect(),
            "response.reasoning_summary_text.delta" | "response.reasoning.delta" | "response.reasoning_text.delta" => {
                delta.map(NativeEvent::reasoning).into_iter().collect()
            }
            "response.output_item.added" => match &event.item {
                Some(item) if item.item_type == "function_call" => self.open_call(item),
                _ => Vec::new(),
            },
            "response.function_call_arguments.delta" => {
                match (self.lookup(event.item_id.as_deref(), event.call_id.as_deref()), delta) {
                    (Some(call), Some(delta)) if !call.closed => {
                        call.args_seen = true;
                        vec![NativeEvent::tool_args(&call.call_id, delta)]
                    }
                    _ => Vec::new(),
                }
            }
            "response.output_item.done" => match &event.item {
                Some(item) if item.item_type == "function_call" => self.close_call(item),
                _ => Vec::new(),
            },
            "response.completed" => {
                let usage = event
                    .response
                    .as_ref()
                    .and_then(|response| response.usage.as_ref())
                    .map(|usage| Usage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        cache_creation_input_tokens: 0,
                        cache_read_input_tokens: usage
                            .input_tokens_details
                            .as_ref()
                            .map_or(0, |details| details.cached_tokens),
                    });

                usage
                    .map(NativeEvent::UsageUpdate)
                    .into_iter()
                    .chain([NativeEvent::StreamDone])
                    .collect()
            }
            "response.failed" | "response.incomplete" => {
                let message = event
                    .response
                    .as_ref()
                    .and_then(|response| response.error.as_ref())
                    .map_or_else(|| format!("{kind} received"), |error| error.message.clone());
                return Err(LlmError::UpstreamProtocol(message));
            }
            "error" => {
                let message = event.message.clone().unwrap_or_else(|| "upstream error event".to_owned());
                return Err(LlmError::UpstreamProtocol(message));
            }
            other => {
                tracing::trace!(event_type = other, "ignoring responses event");
                Vec::new()
            }
        };

        Ok(events)
    }

    fn open_call(&mut self, item: &ResponsesOutputItem) -> Vec<NativeEvent> {
        let call_id = item
            .call_id
            .clone()
            .or_else(|| item.id.clone())
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
        let key = item.id.clone().unwrap_or_else(|| call_id.clone());
        let name = item.name.clone().unwrap_or_default();

        self.calls.insert(
            key,
            FunctionCallState {
                call_id: call_id.clone(),
                args_seen: false,
                closed: false,
            },
        );

        vec![NativeEvent::tool_start(call_id, name)]
    }

    /// Closing event may carry the complete arguments; they are only
    /// forwarded when no argument deltas were streamed for the call
    fn close_call(&mut self, item: &ResponsesOutputItem) -> Vec<NativeEvent> {
        let Some(call) = self.lookup(item.id.as_deref(), item.call_id.as_deref()) else {
            return Vec::new();
        };

        if call.closed {
            return Vec::new();
        }

        call.closed = true;
        let mut events = Vec::with_capacity(2);

        if !call.args_seen
            && let Some(arguments) = item.arguments.as_deref().filter(|a| !a.is_empty())
        {
            events.push(NativeEvent::tool_args(&call.call_id, arguments));
        }

        events.push(NativeEvent::tool_stop(&call.call_id));
        events
    }

    fn lookup(&mut self, item_id: Option<&str>, call_id: Option<&str>) -> Option<&mut FunctionCallState> {
        let key = item_id
            .filter(|id| self.calls.contains_key(*id))
            .map(ToOwned::to_owned)
            .or_else(|| {
                let call_id = call_id?;
                self.calls
                    .iter()
                    .find(|(_, call)| call.call_id == call_id)
                    .map(|(key, _)| key.clone())
            })?;

        self.calls.get_mut(&key)
    }
}
