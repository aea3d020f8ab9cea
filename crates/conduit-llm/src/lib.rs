//! Streaming protocol translation for Conduit
//!
//! Accepts Anthropic Messages requests, dispatches them to one of three
//! upstream protocol families (chat-completions SSE, "responses" SSE, or a
//! JSON-RPC agent subprocess), and re-emits the upstream output as a
//! well-formed Anthropic SSE stream.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod convert;
pub mod credential;
pub mod dispatch;
pub mod effort;
pub mod envelope;
pub mod error;
pub mod protocol;
pub mod provider;
#[cfg(feature = "http")]
pub mod router;
pub mod tokens;
pub mod translate;
pub mod types;

pub use credential::{Credential, CredentialSource};
pub use dispatch::{DispatchEntry, ModelId, ProviderDispatcher};
pub use error::LlmError;
pub use provider::{NativeEventStream, UpstreamAdapter};
#[cfg(feature = "http")]
pub use router::{LlmState, llm_router};
pub use translate::StreamTranslator;
pub use types::{CanonicalRequest, NativeEvent, Usage};
