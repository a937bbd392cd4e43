use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::longpoll::{longpoll_events, longpoll_publish};
use super::metrics::prometheus_metrics;
use super::polling::polling_data;

pub fn api_routes(max_payload_bytes: usize) -> Router<AppState> {
    Router::new()
        // Health, stats & metrics
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api",
            Router::new()
                // Short polling
                .route("/polling/data", get(polling_data))
                // Long polling
                .route("/longpoll/events", get(longpoll_events))
                .route(
                    "/longpoll/publish",
                    post(longpoll_publish).layer(DefaultBodyLimit::max(max_payload_bytes)),
                ),
        )
}
