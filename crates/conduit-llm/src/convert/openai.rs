//! Canonical request to chat completions, and chat chunks to native events

use std::collections::BTreeMap;

use crate::effort::ReasoningEffort;
use crate::error::LlmError;
use crate::protocol::openai::{
    OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiRequest, OpenAiStreamChunk, OpenAiStreamOptions,
    OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{CanonicalRequest, ContentBlock, Message, NativeEvent, Role, ToolChoice, Usage};

/// Build the upstream request body for `model`
pub fn build_request(request: &CanonicalRequest, model: &str, effort: Option<ReasoningEffort>) -> OpenAiRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system_prompt {
        messages.push(OpenAiMessage {
            role: "system".to_owned(),
            content: Some(system.clone()),
            ..OpenAiMessage::default()
        });
    }

    for message in &request.messages {
        match message.role {
            Role::User => push_user_message(&mut messages, message),
            Role::Assistant => messages.push(assistant_message(message)),
        }
    }

    let tools = (!request.tools.is_empty()).then(|| {
        request
            .tools
            .iter()
            .map(|tool| OpenAiTool {
                tool_type: "function",
                function: OpenAiFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                },
            })
            .collect()
    });

    let tool_choice = request.tool_choice.as_ref().map(|choice| match choice {
        ToolChoice::Auto => serde_json::json!("auto"),
        ToolChoice::Any => serde_json::json!("required"),
        ToolChoice::None => serde_json::json!("none"),
        ToolChoice::Tool { name } => serde_json::json!({"type": "function", "function": {"name": name}}),
    });

    // Claude-family models take a raw budget, everything else an effort level
    let claude_budget = request
        .thinking_budget_tokens
        .filter(|_| model.to_ascii_lowercase().contains("claude"));

    let (reasoning_effort, include_reasoning) = match (claude_budget, effort) {
        (None, Some(effort)) => (Some(effort.to_string()), Some(true)),
        _ => (None, None),
    };

    OpenAiRequest {
        model: model.to_owned(),
        messages,
        stream: true,
        stream_options: Some(OpenAiStreamOptions { include_usage: true }),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        tools,
        tool_choice,
        reasoning_effort,
        include_reasoning,
        thinking_budget: claude_budget,
    }
}

/// Tool results become `tool` messages ahead of any remaining user text
fn push_user_message(messages: &mut Vec<OpenAiMessage>, message: &Message) {
    for block in &message.content {
        if let ContentBlock::ToolResult {
            tool_use_id, content, ..
        } = block
        {
            messages.push(OpenAiMessage {
                role: "tool".to_owned(),
                content: Some(content.clone()),
                tool_call_id: Some(tool_use_id.clone()),
                ..OpenAiMessage::default()
            });
        }
    }

    let text = message.joined_text();
    if !text.is_empty() {
        messages.push(OpenAiMessage {
            role: "user".to_owned(),
            content: Some(text),
            ..OpenAiMessage::default()
        });
    }
}

fn assistant_message(message: &Message) -> OpenAiMessage {
    let mut reasoning_text = String::new();
    let mut reasoning_opaque = None;
    let mut tool_calls = Vec::new();

    for block in &message.content {
        match block {
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(OpenAiToolCall {
                id: id.clone(),
                call_type: "function",
                function: OpenAiFunctionCall {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            ContentBlock::Thinking { thinking, signature } => {
                reasoning_text.push_str(thinking);
                if let Some(signature) = signature.as_ref().filter(|s| !s.is_empty()) {
                    reasoning_opaque = Some(signature.clone());
                }
            }
            ContentBlock::Text { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    let text = message.joined_text();

    // Reasoning is only replayed when the backend can verify it
    let (reasoning_text, reasoning_opaque) = match reasoning_opaque {
        Some(opaque) => (Some(reasoning_text), Some(opaque)),
        None => (None, None),
    };

    OpenAiMessage {
        role: "assistant".to_owned(),
        content: (!text.is_empty()).then_some(text),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
        reasoning_text,
        reasoning_opaque,
    }
}

/// Stateful decoder for one chat-completions stream
///
/// Tool calls are tracked per upstream slot index. A slot's start event is
/// held back until its function name is known; argument fragments that
/// arrive earlier are buffered and flushed right after the start.
#[derive(Debug, Default)]
pub struct ChatChunkDecoder {
    slots: BTreeMap<u32, ToolSlot>,
    saw_output: bool,
}

#[derive(Debug)]
struct ToolSlot {
    call_id: String,
    name: Option<String>,
    started: bool,
    closed: bool,
    pending_args: String,
}

impl ToolSlot {
    fn new(call_id: Option<&str>) -> Self {
        Self {
            call_id: call_id.map_or_else(
                || format!("call_{}", uuid::Uuid::new_v4().simple()),
                ToOwned::to_owned,
            ),
            name: None,
            started: false,
            closed: false,
            pending_args: String::new(),
        }
    }
}

impl ChatChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one parsed chunk
    pub fn decode(&mut self, chunk: &OpenAiStreamChunk) -> Result<Vec<NativeEvent>, LlmError> {
        if let Some(error) = &chunk.error {
            return Err(LlmError::UpstreamProtocol(error.message.clone()));
        }

        let mut events = Vec::new();

        for choice in &chunk.choices {
            let delta = &choice.delta;

            if let Some(reasoning) = delta.reasoning_fragment() {
                self.saw_output = true;
                events.push(NativeEvent::reasoning(reasoning));
            }

            if let Some(signature) = delta.reasoning_opaque.as_deref().filter(|s| !s.is_empty()) {
                events.push(NativeEvent::ReasoningSignature {
                    signature: signature.to_owned(),
                });
            }

            if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
                self.saw_output = true;
                events.push(NativeEvent::text(content));
            }

            for (position, call) in delta.tool_calls.iter().flatten().enumerate() {
                let index = call
                    .index
                    .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));
                self.apply_tool_fragment(index, call, &mut events);
            }

            if choice.finish_reason.as_deref() == Some("tool_calls") {
                self.close_slots(&mut events);
            }
        }

        if let Some(usage) = &chunk.usage {
            events.push(NativeEvent::UsageUpdate(usage_from(usage)));
        }

        Ok(events)
    }

    /// Called once the upstream stream ends
    ///
    /// Closes slots still open and rejects a stream that produced nothing.
    pub fn finish(&mut self) -> Result<Vec<NativeEvent>, LlmError> {
        if !self.saw_output {
            return Err(LlmError::UpstreamProtocol("no content received from upstream".to_owned()));
        }

        let mut events = Vec::new();
        self.close_slots(&mut events);
        Ok(events)
    }

    fn apply_tool_fragment(&mut self, index: u32, call: &OpenAiStreamToolCall, events: &mut Vec<NativeEvent>) {
        let id = call.id.as_deref().filter(|id| !id.is_empty());

        // A closed slot seeing a new id means the backend reused the index
        let reuse = self
            .slots
            .get(&index)
            .is_some_and(|slot| slot.closed && id.is_some_and(|id| id != slot.call_id));
        if reuse {
            self.slots.remove(&index);
        }

        let slot = self.slots.entry(index).or_insert_with(|| ToolSlot::new(id));

        if slot.closed {
            tracing::debug!(index, "ignoring fragment for closed tool slot");
            return;
        }

        if let Some(id) = id
            && !slot.started
        {
            id.clone_into(&mut slot.call_id);
        }

        let function = call.function.as_ref();

        if slot.name.is_none()
            && let Some(name) = function.and_then(|f| f.name.as_deref()).filter(|n| !n.is_empty())
        {
            slot.name = Some(name.to_owned());
        }

        if let Some(arguments) = function.and_then(|f| f.arguments.as_deref()).filter(|a| !a.is_empty()) {
            slot.pending_args.push_str(arguments);
        }

        if !slot.started
            && let Some(name) = &slot.name
        {
            slot.started = true;
            self.saw_output = true;
            events.push(NativeEvent::tool_start(&slot.call_id, name));
        }

        if slot.started && !slot.pending_args.is_empty() {
            let partial_json = std::mem::take(&mut slot.pending_args);
            events.push(NativeEvent::tool_args(&slot.call_id, partial_json));
        }
    }

    fn close_slots(&mut self, events: &mut Vec<NativeEvent>) {
        for (index, slot) in &mut self.slots {
            if slot.closed {
                continue;
            }

            slot.closed = true;

            if slot.started {
                events.push(NativeEvent::tool_stop(&slot.call_id));
            } else {
                tracing::warn!(index, call_id = %slot.call_id, "dropping tool call that never received a name");
            }
        }
    }
}

fn usage_from(usage: &OpenAiUsage) -> Usage {
    let cached = usage
        .prompt_tokens_details
        .as_ref()
        .map_or(0, |details| details.cached_tokens);

    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cache_creation_input_tokens: usage.cache_creation_input_tokens,
        cache_read_input_tokens: usage.cache_read_input_tokens.max(cached),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::ToolSpec;

    fn chunk(value: serde_json::Value) -> OpenAiStreamChunk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn content_and_reasoning_deltas() {
        let mut decoder = ChatChunkDecoder::new();

        let events = decoder
            .decode(&chunk(json!({"choices": [{"index": 0, "delta": {"reasoning": "hmm"}}]})))
            .unwrap();
        assert_eq!(events, vec![NativeEvent::reasoning("hmm")]);

        let events = decoder
            .decode(&chunk(json!({"choices": [{"index": 0, "delta": {"content": "Hi"}}]})))
            .unwrap();
        assert_eq!(events, vec![NativeEvent::text("Hi")]);
    }

    #[test]
    fn tool_start_waits_for_name_and_flushes_buffered_args() {
        let mut decoder = ChatChunkDecoder::new();

        let events = decoder
            .decode(&chunk(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "function": {"arguments": "{\"a\""}}
            ]}}]})))
            .unwrap();
        assert!(events.is_empty());

        let events = decoder
            .decode(&chunk(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"name": "lookup", "arguments": ":1}"}}
            ]}}]})))
            .unwrap();
        assert_eq!(
            events,
            vec![
                NativeEvent::tool_start("call_1", "lookup"),
                NativeEvent::tool_args("call_1", "{\"a\":1}"),
            ]
        );
    }

    #[test]
    fn interleaved_slots_keep_their_own_ids() {
        let mut decoder = ChatChunkDecoder::new();

        let events = decoder
            .decode(&chunk(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_a", "function": {"name": "one"}},
                {"index": 1, "id": "call_b", "function": {"name": "two"}}
            ]}}]})))
            .unwrap();
        assert_eq!(
            events,
            vec![
                NativeEvent::tool_start("call_a", "one"),
                NativeEvent::tool_start("call_b", "two"),
            ]
        );

        let events = decoder
            .decode(&chunk(json!({"choices": [{"delta": {"tool_calls": [
                {"index": 1, "function": {"arguments": "{}"}},
                {"index": 0, "function": {"arguments": "[]"}}
            ]}}]})))
            .unwrap();
        assert_eq!(
            events,
            vec![NativeEvent::tool_args("call_b", "{}"), NativeEvent::tool_args("call_a", "[]")]
        );

        let events = decoder
            .decode(&chunk(json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]})))
            .unwrap();
        assert_eq!(events, vec![NativeEvent::tool_stop("call_a"), NativeEvent::tool_stop("call_b")]);

        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn usage_chunk_maps_cache_counters() {
        let mut decoder = ChatChunkDecoder::new();

        let events = decoder
            .decode(&chunk(json!({
                "choices": [],
                "usage": {"prompt_tokens": 10, "completion_tokens": 4, "prompt_tokens_details": {"cached_tokens": 6}}
            })))
            .unwrap();

        assert_eq!(
            events,
            vec![NativeEvent::UsageUpdate(Usage {
                input_tokens: 10,
                output_tokens: 4,
                cache_creation_input_tokens: 0,
                cache_read_input_tokens: 6,
            })]
        );
    }

    #[test]
    fn in_band_error_fails_the_chunk() {
        let mut decoder = ChatChunkDecoder::new();
        let err = decoder
            .decode(&chunk(json!({"error": {"message": "overloaded"}})))
            .unwrap_err();

        assert!(matches!(err, LlmError::UpstreamProtocol(message) if message == "overloaded"));
    }

    #[test]
    fn empty_stream_is_an_error() {
        let mut decoder = ChatChunkDecoder::new();
        assert!(decoder.finish().is_err());
    }

    #[test]
    fn request_maps_tools_results_and_effort() {
        let request = CanonicalRequest {
            system_prompt: Some("be brief".to_owned()),
            messages: vec![
                Message::text(Role::User, "weather?"),
                Message {
                    role: Role::Assistant,
                    content: vec![ContentBlock::ToolUse {
                        id: "call_1".to_owned(),
                        name: "weather".to_owned(),
                        input: json!({"city": "Oslo"}),
                    }],
                },
                Message {
                    role: Role::User,
                    content: vec![ContentBlock::ToolResult {
                        tool_use_id: "call_1".to_owned(),
                        content: "rain".to_owned(),
                        is_error: false,
                    }],
                },
            ],
            tools: vec![ToolSpec {
                name: "weather".to_owned(),
                description: None,
                input_schema: json!({"type": "object"}),
            }],
            tool_choice: Some(ToolChoice::Any),
            thinking_budget_tokens: Some(12_000),
            ..CanonicalRequest::from_prompt("openrouter/openai/gpt-5", "")
        };

        let body = serde_json::to_value(build_request(&request, "openai/gpt-5", Some(ReasoningEffort::Medium))).unwrap();

        assert_eq!(body["model"], "openai/gpt-5");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["arguments"], "{\"city\":\"Oslo\"}");
        assert_eq!(
            body["messages"][3],
            json!({"role": "tool", "content": "rain", "tool_call_id": "call_1"})
        );
        assert_eq!(body["tool_choice"], "required");
        assert_eq!(body["reasoning_effort"], "medium");
        assert!(body.get("thinking_budget").is_none());
    }

    #[test]
    fn claude_models_receive_a_thinking_budget() {
        let request = CanonicalRequest {
            thinking_budget_tokens: Some(8_000),
            ..CanonicalRequest::from_prompt("copilot/claude-sonnet-4", "hi")
        };

        let body = build_request(&request, "claude-sonnet-4", Some(ReasoningEffort::Low));

        assert_eq!(body.thinking_budget, Some(8_000));
        assert_eq!(body.reasoning_effort, None);
    }
}
