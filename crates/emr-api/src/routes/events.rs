//! Server-sent event stream of published domain events.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::state::{AppState, PublishedEvent};

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(stream_events))
}

fn to_sse(item: Result<PublishedEvent, BroadcastStreamRecvError>) -> Option<Event> {
    match item {
        Ok(published) => Event::default()
            .event(published.event)
            .json_data(published.payload)
            .ok(),
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::warn!(missed, "event subscriber lagged");
            None
        }
    }
}

/// GET /api/events
///
/// Each event is named after the published event (`pharmacy_queue.updated`,
/// `visit.updated`) and carries the record as JSON data.
async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.subscribe())
        .filter_map(to_sse)
        .map(Ok);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
