//! Upstream adapters
//!
//! Each adapter opens one upstream per request and yields [`NativeEvent`]s.
//! Failures while opening are returned as `Err`; failures after the stream
//! started are yielded as `Err` items and end the stream.

pub mod agent;
pub mod chat;
pub mod responses;
mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use indexmap::IndexMap;

pub use agent::AgentIpcAdapter;
pub use chat::ChatCompletionAdapter;
pub use responses::ResponsesAdapter;

use crate::credential::Credential;
use crate::effort::ReasoningEffort;
use crate::error::LlmError;
use crate::types::{CanonicalRequest, NativeEvent};

/// Stream of native events produced by an adapter
pub type NativeEventStream = Pin<Box<dyn Stream<Item = Result<NativeEvent, LlmError>> + Send>>;

/// Upstream model an adapter is bound to, with an optional reasoning level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTarget {
    pub model: String,
    pub level: Option<String>,
}

impl ModelTarget {
    pub fn new(model: impl Into<String>, level: Option<String>) -> Self {
        Self {
            model: model.into(),
            level,
        }
    }

    /// Effort for this request; an explicit level wins over the thinking budget
    pub fn effort(&self, request: &CanonicalRequest) -> Option<ReasoningEffort> {
        ReasoningEffort::resolve(self.level.as_deref(), request.thinking_budget_tokens, &self.model)
    }
}

/// Trait implemented by each upstream protocol family
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    /// Open the upstream and stream its output as native events
    async fn stream(&self, request: &CanonicalRequest, credential: Credential) -> Result<NativeEventStream, LlmError>;
}

/// Convert configured extra headers, skipping invalid entries
pub fn parse_headers(provider: &str, headers: &IndexMap<String, String>) -> HeaderMap {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let parsed = HeaderName::try_from(name.as_str())
                .ok()
                .zip(HeaderValue::try_from(value.as_str()).ok());

            if parsed.is_none() {
                tracing::warn!(provider, header = %name, "ignoring invalid header");
            }

            parsed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_headers_are_skipped() {
        let mut headers = IndexMap::new();
        headers.insert("Editor-Version".to_owned(), "vscode/1.99".to_owned());
        headers.insert("bad header".to_owned(), "x".to_owned());

        let parsed = parse_headers("copilot", &headers);

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["editor-version"], "vscode/1.99");
    }

    #[test]
    fn explicit_level_overrides_budget() {
        let request = CanonicalRequest {
            thinking_budget_tokens: Some(20_000),
            ..CanonicalRequest::from_prompt("openai/gpt-5", "hi")
        };

        let target = ModelTarget::new("gpt-5", Some("low".to_owned()));
        assert_eq!(target.effort(&request), Some(ReasoningEffort::Low));

        let target = ModelTarget::new("gpt-5", None);
        assert_eq!(target.effort(&request), Some(ReasoningEffort::High));
    }
}
