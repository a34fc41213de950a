//! SSE (Server-Sent Events) feed of cache events for one key.
//!
//! The subscription lives inside the stream: when the client disconnects and
//! axum drops the stream, the subscription is released with it.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::cache::{CacheEngine, CacheEvent};

/// Events buffered per client before new ones are dropped.
const EVENT_BUFFER: usize = 64;

/// One SSE message.
#[derive(Debug, Serialize)]
pub struct EventMessage {
    pub key: String,
    pub event: CacheEvent,
}

/// Subscribe to `key` and expose its events as an SSE stream.
pub fn key_event_stream(
    engine: &CacheEngine,
    key: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let subscription = engine.subscribe(&key, move |event| {
        // A slow client loses events rather than stalling the dispatcher.
        if tx.try_send(event.clone()).is_err() {
            debug!("SSE client lagging, dropping event");
        }
    });

    ReceiverStream::new(rx).map(move |event| {
        let message = EventMessage {
            key: subscription.key().to_string(),
            event,
        };
        let data = serde_json::to_string(&message).unwrap_or_default();
        Ok(Event::default().event("cache").data(data))
    })
}
