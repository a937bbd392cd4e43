//! Long polling endpoints.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::delivery::LongPollOutcome;
use crate::error::Result;
use crate::server::AppState;

/// GET /api/longpoll/events
///
/// Holds the request until an event is published or the long-poll timeout
/// elapses. A timeout answers `204 No Content`.
#[tracing::instrument(name = "api.longpoll_events", skip(state))]
pub async fn longpoll_events(State(state): State<AppState>) -> Response {
    match state.dispatcher.long_poll().await {
        LongPollOutcome::Delivered(event) => (StatusCode::OK, event.payload).into_response(),
        LongPollOutcome::TimedOut => StatusCode::NO_CONTENT.into_response(),
    }
}

/// POST /api/longpoll/publish - body is the event text
///
/// A body over the limit is rejected while buffering and rendered like every
/// other malformed input.
#[tracing::instrument(name = "api.longpoll_publish", skip(state, body))]
pub async fn longpoll_publish(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<StatusCode> {
    let body = body?;
    state.dispatcher.publish(&body)?;
    Ok(StatusCode::OK)
}
