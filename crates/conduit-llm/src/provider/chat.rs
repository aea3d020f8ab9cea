//! Chat-completions upstream (OpenAI, OpenRouter, Copilot and compatibles)

use async_trait::async_trait;
use http::HeaderMap;
use reqwest::Client;
use secrecy::ExposeSecret;
use url::Url;

use super::sse::{self, FrameDecoder};
use super::{ModelTarget, NativeEventStream, UpstreamAdapter};
use crate::convert::openai::{ChatChunkDecoder, build_request};
use crate::credential::Credential;
use crate::error::LlmError;
use crate::protocol::openai::OpenAiStreamChunk;
use crate::types::{CanonicalRequest, NativeEvent};

/// Adapter for `POST {base}/chat/completions` streams
pub struct ChatCompletionAdapter {
    name: String,
    client: Client,
    base_url: Url,
    headers: HeaderMap,
    target: ModelTarget,
}

impl ChatCompletionAdapter {
    pub fn new(name: impl Into<String>, client: Client, base_url: Url, headers: HeaderMap, target: ModelTarget) -> Self {
        Self {
            name: name.into(),
            client,
            base_url,
            headers,
            target,
        }
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

impl FrameDecoder for ChatChunkDecoder {
    type Frame = OpenAiStreamChunk;

    fn decode(&mut self, _name: &str, frame: &OpenAiStreamChunk) -> Result<Vec<NativeEvent>, LlmError> {
        Self::decode(self, frame)
    }

    fn finish(&mut self) -> Result<Vec<NativeEvent>, LlmError> {
        let mut events = Self::finish(self)?;
        events.push(NativeEvent::StreamDone);
        Ok(events)
    }
}

#[async_trait]
impl UpstreamAdapter for ChatCompletionAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: &CanonicalRequest, credential: Credential) -> Result<NativeEventStream, LlmError> {
        let body = build_request(request, &self.target.model, self.target.effort(request));

        tracing::debug!(
            provider = %self.name,
            model = %self.target.model,
            messages = body.messages.len(),
            "opening chat completions stream"
        );

        let mut builder = self
            .client
            .post(self.completions_url())
            .headers(self.headers.clone())
            .header(http::header::ACCEPT, "text/event-stream")
            .json(&body);

        if !credential.is_empty() {
            builder = builder.bearer_auth(credential.value.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(provider = %self.name, error = %e, "upstream stream request failed");
            LlmError::UpstreamProtocol(e.to_string())
        })?;

        let response = sse::check_response(&self.name, response).await?;

        Ok(sse::decode_stream(self.name.clone(), response, ChatChunkDecoder::new()))
    }
}
