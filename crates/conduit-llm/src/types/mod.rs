//! Backend-agnostic request and event types

mod event;
mod message;
mod request;

pub use event::{NativeEvent, Usage};
pub use message::{ContentBlock, Message, Role};
pub use request::{CanonicalRequest, ToolChoice, ToolSpec};
