use super::Message;

/// Normalized inbound request, built once and never mutated
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRequest {
    /// Model identifier as sent by the client (`<provider>/<model>[:<level>]`)
    pub model_id: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: Option<ToolChoice>,
    /// Token budget for extended thinking, when requested
    pub thinking_budget_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl CanonicalRequest {
    /// Request with a single user message and nothing else set
    pub fn from_prompt(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system_prompt: None,
            messages: vec![Message::text(super::Role::User, prompt)],
            tools: Vec::new(),
            tool_choice: None,
            thinking_budget_tokens: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Tool the model may call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema of the tool's input
    pub input_schema: serde_json::Value,
}

/// Constraint on tool use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    Any,
    None,
    Tool { name: String },
}
