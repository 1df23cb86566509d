//! Server-Sent Events stream of task lifecycle events
//!
//! Additive to the polling endpoints: clients that want live progress
//! subscribe here instead of hammering the status routes. Slow consumers lag
//! and miss events; the status endpoints remain authoritative.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use tracing::debug;

use crate::AppState;

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    debug!("new SSE subscriber");

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("ok"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(payload) => {
                            yield Ok(Event::default().event(name).data(payload));
                        }
                        Err(err) => {
                            debug!(error = %err, "dropping unserialisable event");
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "SSE subscriber lagged");
                    yield Ok(Event::default().event("lagged").data(missed.to_string()));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Build event stream routes
pub fn sse_routes() -> Router<AppState> {
    Router::new().route("/api/events", get(event_stream))
}
