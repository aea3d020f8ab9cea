#![allow(dead_code)]

pub mod config;
pub mod mock_upstream;
pub mod server;

/// Parsed `event:`/`data:` pair from an SSE body
#[derive(Debug)]
pub struct SseFrame {
    pub event: String,
    pub data: serde_json::Value,
}

/// Parse SSE frames from raw response text, skipping keep-alive comments
pub fn parse_sse(text: &str) -> Vec<SseFrame> {
    text.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event: ") {
                    event = Some(value.to_owned());
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(value).ok();
                }
            }
            Some(SseFrame {
                event: event?,
                data: data?,
            })
        })
        .collect()
}

/// Event names in stream order
pub fn event_names(frames: &[SseFrame]) -> Vec<&str> {
    frames.iter().map(|frame| frame.event.as_str()).collect()
}
