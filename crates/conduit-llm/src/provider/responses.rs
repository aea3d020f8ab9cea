//! Named-event "responses" upstream

use async_trait::async_trait;
use http::HeaderMap;
use reqwest::Client;
use secrecy::ExposeSecret;
use url::Url;

use super::sse::{self, FrameDecoder};
use super::{ModelTarget, NativeEventStream, UpstreamAdapter};
use crate::convert::responses::{ResponsesDecoder, build_request};
use crate::credential::Credential;
use crate::error::LlmError;
use crate::protocol::responses::ResponsesStreamEvent;
use crate::types::{CanonicalRequest, NativeEvent};

/// Header carrying the account id on ChatGPT-backed endpoints
const ACCOUNT_ID_HEADER: &str = "ChatGPT-Account-Id";

/// Adapter for a responses endpoint
pub struct ResponsesAdapter {
    name: String,
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
    store: Option<bool>,
    target: ModelTarget,
}

impl ResponsesAdapter {
    pub fn new(
        name: impl Into<String>,
        client: Client,
        endpoint: Url,
        headers: HeaderMap,
        store: Option<bool>,
        target: ModelTarget,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            endpoint,
            headers,
            store,
            target,
        }
    }
}

impl FrameDecoder for ResponsesDecoder {
    type Frame = ResponsesStreamEvent;

    fn decode(&mut self, name: &str, frame: &ResponsesStreamEvent) -> Result<Vec<NativeEvent>, LlmError> {
        self.decode_named(name, frame)
    }

    /// The body must not end before `response.completed`
    fn finish(&mut self) -> Result<Vec<NativeEvent>, LlmError> {
        Err(LlmError::UpstreamProtocol(
            "stream ended before response.completed".to_owned(),
        ))
    }
}

#[async_trait]
impl UpstreamAdapter for ResponsesAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: &CanonicalRequest, credential: Credential) -> Result<NativeEventStream, LlmError> {
        let body = build_request(request, &self.target.model, self.target.effort(request), self.store);

        tracing::debug!(
            provider = %self.name,
            model = %self.target.model,
            items = body.input.len(),
            "opening responses stream"
        );

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(http::header::ACCEPT, "text/event-stream")
            .json(&body);

        if !credential.is_empty() {
            builder = builder.bearer_auth(credential.value.expose_secret());
        }

        if let Some(account_id) = &credential.account_id {
            builder = builder.header(ACCOUNT_ID_HEADER, account_id);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(provider = %self.name, error = %e, "upstream stream request failed");
            LlmError::UpstreamProtocol(e.to_string())
        })?;

        let response = sse::check_response(&self.name, response).await?;

        Ok(sse::decode_stream(self.name.clone(), response, ResponsesDecoder::new()))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::types::Usage;

    fn sse_response(body: &str) -> reqwest::Response {
        let response = http::Response::builder()
            .header(http::header::CONTENT_TYPE, "text/event-stream")
            .body(body.to_owned())
            .unwrap();
        reqwest::Response::from(response)
    }

    async fn decode(body: &str) -> Vec<Result<NativeEvent, LlmError>> {
        sse::decode_stream("openai".to_owned(), sse_response(body), ResponsesDecoder::new())
            .collect()
            .await
    }

    #[tokio::test]
    async fn frames_named_only_by_event_line_are_decoded() {
        let events = decode(
            "event: response.output_text.delta\ndata: {\"delta\":\"Hi\"}\n\n\
             event: response.completed\ndata: {\"response\":{\"usage\":{\"input_tokens\":4,\"output_tokens\":1}}}\n\n",
        )
        .await;

        let events: Vec<NativeEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                NativeEvent::text("Hi"),
                NativeEvent::UsageUpdate(Usage::new(4, 1)),
                NativeEvent::StreamDone,
            ]
        );
    }

    #[tokio::test]
    async fn body_ending_before_completion_is_an_error() {
        let events = decode("event: response.output_text.delta\ndata: {\"delta\":\"Hi\"}\n\n").await;

        assert!(matches!(events.first(), Some(Ok(event)) if *event == NativeEvent::text("Hi")));
        assert!(matches!(events.last(), Some(Err(LlmError::UpstreamProtocol(_)))));
    }
}
