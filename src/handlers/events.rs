//! # Event Stream Handler
//!
//! Server-sent events carrying [`MonitorEvent`]s.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;

use crate::events::MonitorEvent;
use crate::server::AppState;

/// Subscribe to change events
///
/// Each SSE message uses the event name (for example `incidents.updated`) as
/// its `event:` field and the JSON-encoded event as `data:`.
#[utoipa::path(
    get,
    path = "/events",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = MonitorEvent)
    ),
    tag = "events"
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.monitor.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                    Ok(sse) => return Some((Ok(sse), rx)),
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to encode monitor event");
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
