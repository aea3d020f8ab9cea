//! Inbound Anthropic request to [`CanonicalRequest`]

use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicRequest, AnthropicSystem, AnthropicToolChoice,
};
use crate::types::{CanonicalRequest, ContentBlock, Message, Role, ToolChoice, ToolSpec};

impl TryFrom<AnthropicRequest> for CanonicalRequest {
    type Error = LlmError;

    fn try_from(request: AnthropicRequest) -> Result<Self, Self::Error> {
        let system_prompt = request.system.map(|system| match system {
            AnthropicSystem::Text(text) => text,
            AnthropicSystem::Blocks(blocks) => blocks
                .into_iter()
                .map(|block| block.text)
                .collect::<Vec<_>>()
                .join("\n\n"),
        });

        let messages = request
            .messages
            .into_iter()
            .map(|message| {
                let role = match message.role.as_str() {
                    "user" => Role::User,
                    "assistant" => Role::Assistant,
                    other => return Err(LlmError::InvalidRequest(format!("unsupported message role '{other}'"))),
                };

                Ok(Message {
                    role,
                    content: content_blocks(message.content),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tools = request
            .tools
            .unwrap_or_default()
            .into_iter()
            .map(|tool| ToolSpec {
                name: tool.name,
                description: tool.description,
                input_schema: tool.input_schema,
            })
            .collect();

        let tool_choice = request.tool_choice.map(|choice| match choice {
            AnthropicToolChoice::Auto => ToolChoice::Auto,
            AnthropicToolChoice::Any => ToolChoice::Any,
            AnthropicToolChoice::None => ToolChoice::None,
            AnthropicToolChoice::Tool { name } => ToolChoice::Tool { name },
        });

        let thinking_budget_tokens = request
            .thinking
            .filter(|thinking| thinking.thinking_type == "enabled")
            .and_then(|thinking| thinking.budget_tokens);

        Ok(Self {
            model_id: request.model,
            system_prompt: system_prompt.filter(|prompt| !prompt.is_empty()),
            messages,
            tools,
            tool_choice,
            thinking_budget_tokens,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        })
    }
}

fn content_blocks(content: AnthropicContent) -> Vec<ContentBlock> {
    match content {
        AnthropicContent::Text(text) => vec![ContentBlock::Text { text }],
        AnthropicContent::Blocks(blocks) => blocks
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(ContentBlock::Text { text }),
                AnthropicContentBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse { id, name, input }),
                AnthropicContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(ContentBlock::ToolResult {
                    tool_use_id,
                    content: content.map(|c| c.into_text()).unwrap_or_default(),
                    is_error: is_error.unwrap_or(false),
                }),
                AnthropicContentBlock::Thinking { thinking, signature } => {
                    Some(ContentBlock::Thinking { thinking, signature })
                }
                AnthropicContentBlock::Unsupported => {
                    tracing::debug!("dropping content block with no upstream counterpart");
                    None
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: serde_json::Value) -> Result<CanonicalRequest, LlmError> {
        let request: AnthropicRequest = serde_json::from_value(value).unwrap();
        CanonicalRequest::try_from(request)
    }

    #[test]
    fn string_content_becomes_single_text_block() {
        let request = parse(json!({
            "model": "openrouter/anthropic/claude-sonnet-4",
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        assert_eq!(request.model_id, "openrouter/anthropic/claude-sonnet-4");
        assert_eq!(request.messages, vec![Message::text(Role::User, "hi")]);
        assert_eq!(request.max_tokens, Some(1024));
    }

    #[test]
    fn system_blocks_are_joined() {
        let request = parse(json!({
            "model": "m",
            "system": [{"type": "text", "text": "one"}, {"type": "text", "text": "two"}],
            "messages": []
        }))
        .unwrap();

        assert_eq!(request.system_prompt.as_deref(), Some("one\n\ntwo"));
    }

    #[test]
    fn tool_blocks_and_thinking_budget_are_kept() {
        let request = parse(json!({
            "model": "m",
            "thinking": {"type": "enabled", "budget_tokens": 16000},
            "tools": [{"name": "read", "input_schema": {"type": "object"}}],
            "tool_choice": {"type": "tool", "name": "read"},
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "read", "input": {"path": "a"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": [{"type": "text", "text": "body"}]}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(request.thinking_budget_tokens, Some(16000));
        assert_eq!(request.tools[0].name, "read");
        assert_eq!(request.tool_choice, Some(ToolChoice::Tool { name: "read".to_owned() }));
        assert_eq!(
            request.messages[1].content,
            vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_owned(),
                content: "body".to_owned(),
                is_error: false,
            }]
        );
    }

    #[test]
    fn disabled_thinking_has_no_budget() {
        let request = parse(json!({
            "model": "m",
            "thinking": {"type": "disabled", "budget_tokens": 2048},
            "messages": []
        }))
        .unwrap();

        assert_eq!(request.thinking_budget_tokens, None);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = parse(json!({
            "model": "m",
            "messages": [{"role": "system", "content": "x"}]
        }))
        .unwrap_err();

        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}
