//! Native events to Anthropic stream events
//!
//! One [`StreamTranslator`] exists per request. It owns the block bookkeeping
//! and guarantees that at most one of text or thinking is open at a time,
//! that thinking closes (with its signature) before anything else opens, and
//! that every opened block is closed before `message_stop`.

use std::collections::HashMap;

use crate::protocol::anthropic::{
    AnthropicMessageDelta, AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent,
    AnthropicStreamMessage,
};
use crate::types::{NativeEvent, Usage};

/// Block bookkeeping for one downstream message
#[derive(Debug, Default)]
pub struct StreamState {
    next_block_index: u32,
    active_text_index: Option<u32>,
    active_thinking_index: Option<u32>,
    /// Signature to attach when the open thinking block closes
    pending_signature: Option<String>,
    open_tool_blocks: HashMap<String, ToolBlock>,
    tool_used: bool,
}

#[derive(Debug, Clone, Copy)]
struct ToolBlock {
    index: u32,
    closed: bool,
}

impl StreamState {
    const fn allocate(&mut self) -> u32 {
        let index = self.next_block_index;
        self.next_block_index += 1;
        index
    }
}

#[derive(Debug)]
pub struct StreamTranslator {
    message_id: String,
    model: String,
    state: StreamState,
    usage: Usage,
    started: bool,
    finished: bool,
}

impl StreamTranslator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            message_id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: model.into(),
            state: StreamState::default(),
            usage: Usage::default(),
            started: false,
            finished: false,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Whether any content block has been opened
    pub const fn has_content(&self) -> bool {
        self.state.next_block_index > 0
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// `message_start` with zero usage; emitted once
    pub fn start(&mut self) -> Vec<AnthropicStreamEvent> {
        if self.started {
            return Vec::new();
        }

        self.started = true;
        vec![AnthropicStreamEvent::MessageStart {
            message: AnthropicStreamMessage::new(&self.message_id, &self.model),
        }]
    }

    /// Apply one native event; events after `finish` are ignored
    pub fn push(&mut self, event: NativeEvent) -> Vec<AnthropicStreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut out = self.start();

        match event {
            NativeEvent::ReasoningDelta { text } => {
                if !text.is_empty() {
                    self.close_text(&mut out);
                    let index = self.open_thinking(&mut out);
                    out.push(block_delta(index, AnthropicStreamDelta::ThinkingDelta { thinking: text }));
                }
            }
            NativeEvent::ReasoningSignature { signature } => {
                if !signature.is_empty() {
                    self.state.pending_signature = Some(signature);
                }
            }
            NativeEvent::TextDelta { text } => {
                if !text.is_empty() {
                    self.emit_text(text, &mut out);
                }
            }
            NativeEvent::ToolCallStart { call_id, name } => self.start_tool(call_id, name, &mut out),
            NativeEvent::ToolCallArgsDelta { call_id, partial_json } => {
                if let Some(block) = self.state.open_tool_blocks.get(&call_id)
                    && !block.closed
                    && !partial_json.is_empty()
                {
                    out.push(block_delta(
                        block.index,
                        AnthropicStreamDelta::InputJsonDelta { partial_json },
                    ));
                }
            }
            NativeEvent::ToolCallStop { call_id } => {
                if let Some(block) = self.state.open_tool_blocks.get_mut(&call_id)
                    && !block.closed
                {
                    block.closed = true;
                    out.push(AnthropicStreamEvent::ContentBlockStop { index: block.index });
                }
            }
            NativeEvent::UsageUpdate(usage) => self.usage = usage,
            NativeEvent::StreamError { message } => self.emit_text(format!("Error: {message}"), &mut out),
            NativeEvent::StreamDone => out.extend(self.finish()),
        }

        out
    }

    /// Close everything still open and terminate the message; emitted once
    pub fn finish(&mut self) -> Vec<AnthropicStreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut out = self.start();
        self.finished = true;

        self.close_thinking(&mut out);
        self.close_text(&mut out);

        let mut open: Vec<&mut ToolBlock> = self
            .state
            .open_tool_blocks
            .values_mut()
            .filter(|block| !block.closed)
            .collect();
        open.sort_by_key(|block| block.index);

        for block in open {
            block.closed = true;
            out.push(AnthropicStreamEvent::ContentBlockStop { index: block.index });
        }

        let stop_reason = if self.state.tool_used { "tool_use" } else { "end_turn" };

        out.push(AnthropicStreamEvent::MessageDelta {
            delta: AnthropicMessageDelta {
                stop_reason: Some(stop_reason.to_owned()),
                stop_sequence: None,
            },
            usage: self.usage,
        });
        out.push(AnthropicStreamEvent::MessageStop);

        out
    }

    fn emit_text(&mut self, text: String, out: &mut Vec<AnthropicStreamEvent>) {
        self.close_thinking(out);
        let index = self.open_text(out);
        out.push(block_delta(index, AnthropicStreamDelta::TextDelta { text }));
    }

    fn start_tool(&mut self, call_id: String, name: String, out: &mut Vec<AnthropicStreamEvent>) {
        if self
            .state
            .open_tool_blocks
            .get(&call_id)
            .is_some_and(|block| !block.closed)
        {
            tracing::debug!(call_id = %call_id, "ignoring duplicate tool call start");
            return;
        }

        self.close_thinking(out);
        self.close_text(out);

        let index = self.state.allocate();
        self.state
            .open_tool_blocks
            .insert(call_id.clone(), ToolBlock { index, closed: false });
        self.state.tool_used = true;

        out.push(AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicStreamContentBlock::ToolUse {
                id: call_id,
                name,
                input: serde_json::json!({}),
            },
        });
        out.push(AnthropicStreamEvent::Ping);
    }

    fn open_text(&mut self, out: &mut Vec<AnthropicStreamEvent>) -> u32 {
        if let Some(index) = self.state.active_text_index {
            return index;
        }

        let index = self.state.allocate();
        self.state.active_text_index = Some(index);
        out.push(AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicStreamContentBlock::Text { text: String::new() },
        });
        index
    }

    fn close_text(&mut self, out: &mut Vec<AnthropicStreamEvent>) {
        if let Some(index) = self.state.active_text_index.take() {
            out.push(AnthropicStreamEvent::ContentBlockStop { index });
        }
    }

    fn open_thinking(&mut self, out: &mut Vec<AnthropicStreamEvent>) -> u32 {
        if let Some(index) = self.state.active_thinking_index {
            return index;
        }

        let index = self.state.allocate();
        self.state.active_thinking_index = Some(index);
        out.push(AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicStreamContentBlock::Thinking {
                thinking: String::new(),
                signature: String::new(),
            },
        });
        index
    }

    fn close_thinking(&mut self, out: &mut Vec<AnthropicStreamEvent>) {
        if let Some(index) = self.state.active_thinking_index.take() {
            let signature = self.state.pending_signature.take().unwrap_or_default();
            out.push(block_delta(index, AnthropicStreamDelta::SignatureDelta { signature }));
            out.push(AnthropicStreamEvent::ContentBlockStop { index });
        }
    }
}

const fn block_delta(index: u32, delta: AnthropicStreamDelta) -> AnthropicStreamEvent {
    AnthropicStreamEvent::ContentBlockDelta { index, delta }
}
