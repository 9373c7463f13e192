use std::{pin::Pin, time::Duration};

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::{stream::once, Stream, StreamExt};
use serde::Serialize;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, axum::Error>> + Send>>;
pub type SseResponse = Sse<KeepAliveStream<EventStream>>;

/// How often progress rows are re-read while a stream is live.
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn sse_with_keep_alive(stream: EventStream) -> SseResponse {
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

pub fn error_stream(message: impl Into<String>) -> SseResponse {
    let message = message.into();
    let stream: EventStream =
        once(async move { Ok(Event::default().event("error").data(message)) }).boxed();
    sse_with_keep_alive(stream)
}

/// A progress event as delivered on every SSE stream.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressEvent {
    pub status: String,
    pub progress: u8,
    pub message: String,
}

/// Builds the standard progress stream: emit the current persisted event
/// immediately (last-value replay for reconnecting clients), then follow
/// updates until a terminal event is delivered.
///
/// `fetch` reads the latest persisted event; `is_terminal` decides when the
/// finite stream ends.
pub fn progress_stream<F, Fut>(fetch: F, is_terminal: fn(&ProgressEvent) -> bool) -> SseResponse
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Option<ProgressEvent>> + Send + 'static,
{
    let stream: EventStream = stream! {
        let mut last: Option<ProgressEvent> = None;

        loop {
            match fetch().await {
                Some(event) => {
                    let changed = last.as_ref() != Some(&event);
                    if changed {
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(err) => {
                                yield Ok(Event::default().event("error").data(err.to_string()));
                                break;
                            }
                        };
                        yield Ok(Event::default().event("progress").data(payload));

                        let terminal = is_terminal(&event);
                        last = Some(event);
                        if terminal {
                            break;
                        }
                    }
                }
                None => {
                    yield Ok(Event::default().event("error").data("not found"));
                    break;
                }
            }

            tokio::time::sleep(PROGRESS_POLL_INTERVAL).await;
        }
    }
    .boxed();

    sse_with_keep_alive(stream)
}
