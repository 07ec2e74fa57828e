use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::rchain::chat_models::ChunkStream;
use crate::rchain::provider::{Provider, ProviderError};

/// What one server-sent event contributed to the reply.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseStep {
    Text(String),
    Skip,
    Done,
}

/// Turns an SSE response body into a stream of text chunks.
///
/// `decode` receives the event name and data of every event. Empty text is
/// never yielded. The first error ends the stream.
pub(crate) fn text_chunks<F>(response: reqwest::Response, provider: Provider, mut decode: F) -> ChunkStream
where
    F: FnMut(&str, &str) -> Result<SseStep, ProviderError> + Send + 'static,
{
    let mut events = response.bytes_stream().eventsource();
    let stream = async_stream::stream! {
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    yield Err(ProviderError::Stream {
                        provider,
                        message: err.to_string(),
                    });
                    break;
                }
            };
            trace!(provider = provider.as_str(), event = %event.event, "sse event");
            match decode(&event.event, &event.data) {
                Ok(SseStep::Text(text)) if !text.is_empty() => yield Ok(text),
                Ok(SseStep::Text(_)) | Ok(SseStep::Skip) => {}
                Ok(SseStep::Done) => break,
                Err(err) => {
                    yield Err(err);
                    break;
                }
            }
        }
    };
    Box::pin(stream)
}

pub(crate) fn parse_event<T: DeserializeOwned>(provider: Provider, data: &str) -> Result<T, ProviderError> {
    serde_json::from_str(data).map_err(|err| ProviderError::Stream {
        provider,
        message: format!("invalid event payload: {err}"),
    })
}
