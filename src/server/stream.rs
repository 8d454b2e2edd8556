//! SSE framing of run streams

use crate::events::{DONE_SENTINEL, FlowEvent, encode_data};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use std::convert::Infallible;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// A run stream with keep-alive comments between events
pub type RunSse = Sse<KeepAliveStream<SseStream>>;

/// Forward a run's events, then close with the sentinel
pub fn event_stream(events: mpsc::Receiver<FlowEvent>) -> RunSse {
    let frames = ReceiverStream::new(events).map(|event| Ok(to_sse(&event)));
    let stream: SseStream = Box::pin(frames.chain(done()));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// A lone event followed by the sentinel
pub fn single_event(event: FlowEvent) -> Sse<SseStream> {
    let stream: SseStream = Box::pin(tokio_stream::once(Ok(to_sse(&event))).chain(done()));
    Sse::new(stream)
}

fn done() -> impl Stream<Item = Result<Event, Infallible>> {
    tokio_stream::once(Ok(Event::default().data(DONE_SENTINEL)))
}

fn to_sse(event: &FlowEvent) -> Event {
    match encode_data(event) {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode event");
            Event::default().comment("unencodable event")
        }
    }
}
