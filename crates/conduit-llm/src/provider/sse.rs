//! Shared SSE plumbing for the HTTP adapters

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;

use super::NativeEventStream;
use crate::error::LlmError;
use crate::types::NativeEvent;

/// Per-stream decoding state for one upstream wire format
pub(super) trait FrameDecoder: Send + 'static {
    type Frame: DeserializeOwned;

    /// Translate one frame named by its SSE `event:` field
    ///
    /// A batch containing `StreamDone` ends the stream.
    fn decode(&mut self, name: &str, frame: &Self::Frame) -> Result<Vec<NativeEvent>, LlmError>;

    /// The `[DONE]` sentinel arrived or the body ended
    fn finish(&mut self) -> Result<Vec<NativeEvent>, LlmError>;
}

/// Reject non-success statuses and JSON error bodies before streaming
pub(super) async fn check_response(provider: &str, response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if status.is_success() && !is_json {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider, %status, "upstream rejected stream request");

    Err(LlmError::UpstreamHttp { status, body })
}

/// Decode an SSE body with `decoder`, ending after `StreamDone` or the first error
pub(super) fn decode_stream<D: FrameDecoder>(provider: String, response: reqwest::Response, decoder: D) -> NativeEventStream {
    let events = Box::pin(response.bytes_stream().eventsource());

    let batches = futures_util::stream::unfold(Some((events, decoder)), move |state| {
        let provider = provider.clone();
        async move {
            let (mut events, mut decoder) = state?;

            loop {
                let (batch, terminal) = match events.next().await {
                    Some(Ok(event)) => {
                        let data = event.data.trim();

                        if data == "[DONE]" {
                            (decoder.finish(), true)
                        } else {
                            match serde_json::from_str::<D::Frame>(data) {
                                Ok(frame) => (decoder.decode(&event.event, &frame), false),
                                Err(e) => {
                                    tracing::debug!(provider = %provider, error = %e, data, "skipping unparseable SSE frame");
                                    continue;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => (Err(LlmError::UpstreamProtocol(format!("SSE stream failed: {e}"))), true),
                    None => (decoder.finish(), true),
                };

                match batch {
                    Ok(batch) if batch.is_empty() && !terminal => {}
                    Ok(batch) => {
                        let done = terminal || batch.contains(&NativeEvent::StreamDone);
                        let next = (!done).then_some((events, decoder));
                        return Some((batch.into_iter().map(Ok).collect::<Vec<_>>(), next));
                    }
                    Err(e) => {
                        tracing::warn!(provider = %provider, error = %e, "upstream stream failed");
                        return Some((vec![Err(e)], None));
                    }
                }
            }
        }
    });

    Box::pin(batches.flat_map(futures_util::stream::iter))
}
