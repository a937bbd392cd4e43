//! SSE handler implementation.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::StreamExt;

use crate::server::AppState;

/// Open a tick stream for this client
#[tracing::instrument(name = "sse.connect", skip(state))]
pub async fn sse_handler(State(state): State<AppState>) -> Response {
    let ticks = state.dispatcher.open_stream(state.shutdown.subscribe());
    let stream = ticks.map(|tick| Ok::<_, Infallible>(Event::default().data(tick)));

    let sse = Sse::new(stream);
    match state.settings.sse.keep_alive_secs {
        0 => sse.into_response(),
        secs => sse
            .keep_alive(
                KeepAlive::new()
                    .interval(Duration::from_secs(secs))
                    .text("keep-alive"),
            )
            .into_response(),
    }
}
