//! Server-Sent Events endpoint streaming a pipeline's event envelope.
//!
//! Events are published to an in-memory broadcast channel keyed by pipeline
//! id. A client connecting after the run has finished simply sees the stream
//! end; there is no history replay.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::RwLock;

use axum::extract::Path;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

lazy_static::lazy_static! {
    static ref CHANNELS: RwLock<HashMap<String, broadcast::Sender<String>>> = RwLock::new(HashMap::new());
}

fn channel_for(pipeline_id: &str) -> broadcast::Sender<String> {
    let mut channels = CHANNELS.write().unwrap();
    channels
        .entry(pipeline_id.to_string())
        .or_insert_with(|| broadcast::channel(256).0)
        .clone()
}

/// `GET /api/pipelines/:id/events` — `data: <json>\n\n` framing per event.
pub async fn stream_events(Path(pipeline_id): Path<String>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(pipeline_id = %pipeline_id, "SSE connection established");
    let rx = channel_for(&pipeline_id).subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(text) => Some(Ok(Event::default().data(text))),
            Err(e) => {
                tracing::warn!("broadcast receiver lagged: {e}");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Publish a pre-serialized event envelope to a pipeline's SSE stream.
/// Silently dropped if no client is connected.
pub fn publish_event(pipeline_id: &str, event_json: String) {
    let _ = channel_for(pipeline_id).send(event_json);
}

/// Drop a pipeline's channel once the run has no more subscribers and has
/// completed. Called from the background task after the run finishes.
pub fn cleanup(pipeline_id: &str) {
    CHANNELS.write().unwrap().remove(pipeline_id);
}
