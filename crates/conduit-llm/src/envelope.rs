//! Guaranteed-termination wrapper around the translation pipeline
//!
//! Whatever the adapter does, the downstream sequence starts with exactly one
//! `message_start` and ends with exactly one `message_stop`. A failure before
//! any block exists becomes an `error` event; a failure after content has been
//! streamed is rendered as text and the message finishes normally.

use std::future::Future;
use std::pin::Pin;

use conduit_core::HttpError;
use futures_util::{Stream, StreamExt};

use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicErrorDetail, AnthropicStreamEvent};
use crate::provider::NativeEventStream;
use crate::translate::StreamTranslator;
use crate::types::NativeEvent;

/// Future resolving to an open upstream stream
pub type OpenFuture = Pin<Box<dyn Future<Output = Result<NativeEventStream, LlmError>> + Send>>;

enum Phase {
    Start(OpenFuture),
    Opening(OpenFuture),
    Streaming(NativeEventStream),
    Done,
}

/// Drive `open` and translate its events into a terminated downstream stream
///
/// Dropping the returned stream drops the adapter stream, releasing the
/// upstream connection or subprocess.
pub fn envelope(
    model: impl Into<String>,
    open: OpenFuture,
) -> impl Stream<Item = AnthropicStreamEvent> + Send + 'static {
    let translator = StreamTranslator::new(model);

    futures_util::stream::unfold((Phase::Start(open), translator), |(phase, mut translator)| async move {
        match phase {
            Phase::Start(open) => Some((translator.start(), (Phase::Opening(open), translator))),
            Phase::Opening(open) => match open.await {
                Ok(stream) => Some((vec![AnthropicStreamEvent::Ping], (Phase::Streaming(stream), translator))),
                Err(e) => Some((fail(&mut translator, &e), (Phase::Done, translator))),
            },
            Phase::Streaming(mut stream) => loop {
                match stream.next().await {
                    Some(Ok(event)) => {
                        let out = translator.push(event);
                        if translator.is_finished() {
                            return Some((out, (Phase::Done, translator)));
                        }
                        if !out.is_empty() {
                            return Some((out, (Phase::Streaming(stream), translator)));
                        }
                    }
                    Some(Err(e)) => return Some((fail(&mut translator, &e), (Phase::Done, translator))),
                    None => return Some((translator.finish(), (Phase::Done, translator))),
                }
            },
            Phase::Done => None,
        }
    })
    .flat_map(futures_util::stream::iter)
}

/// Render a pipeline failure and finish the message
fn fail(translator: &mut StreamTranslator, error: &LlmError) -> Vec<AnthropicStreamEvent> {
    tracing::warn!(
        message_id = translator.message_id(),
        error = %error,
        error_type = error.error_type(),
        "upstream failed"
    );

    if translator.has_content() {
        let mut out = translator.push(NativeEvent::StreamError {
            message: error.client_message(),
        });
        out.extend(translator.finish());
        return out;
    }

    let mut out = vec![AnthropicStreamEvent::Error {
        error: AnthropicErrorDetail {
            error_type: error.error_type().to_owned(),
            message: error.client_message(),
        },
    }];
    out.extend(translator.finish());
    out
}
