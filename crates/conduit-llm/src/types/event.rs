use serde::Serialize;

/// Incremental event produced by an upstream adapter
///
/// This is the whole contract between adapters and the translator: adapters
/// never see downstream block indices and the translator never sees upstream
/// wire formats.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    ReasoningDelta { text: String },
    /// Opaque reasoning signature, attached when the thinking block closes
    ReasoningSignature { signature: String },
    TextDelta { text: String },
    ToolCallStart { call_id: String, name: String },
    ToolCallArgsDelta { call_id: String, partial_json: String },
    ToolCallStop { call_id: String },
    /// Replaces the usage counters reported so far
    UsageUpdate(Usage),
    /// Error the upstream reported in-band; rendered as text
    StreamError { message: String },
    StreamDone,
}

impl NativeEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::ReasoningDelta { text: text.into() }
    }

    pub fn tool_start(call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolCallStart {
            call_id: call_id.into(),
            name: name.into(),
        }
    }

    pub fn tool_args(call_id: impl Into<String>, partial_json: impl Into<String>) -> Self {
        Self::ToolCallArgsDelta {
            call_id: call_id.into(),
            partial_json: partial_json.into(),
        }
    }

    pub fn tool_stop(call_id: impl Into<String>) -> Self {
        Self::ToolCallStop { call_id: call_id.into() }
    }
}

/// Token accounting; every counter defaults to zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_creation_input_tokens: u32,
    pub cache_read_input_tokens: u32,
}

impl Usage {
    pub const fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
        }
    }
}
