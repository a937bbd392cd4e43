//! Prometheus metrics endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::metrics;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state);

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Refresh gauges that are sampled rather than tracked on every change
fn update_metrics_from_state(state: &AppState) {
    let dispatcher = &state.dispatcher;

    let queue_stats = dispatcher.queue().stats();
    metrics::LONGPOLL_PENDING.set(queue_stats.pending as i64);
    metrics::LONGPOLL_WAITERS.set(queue_stats.waiters as i64);

    metrics::TICKER_SUBSCRIPTIONS.set(dispatcher.ticker().active_subscriptions() as i64);

    let registry_stats = dispatcher.registry().stats();
    metrics::SUBSCRIPTIONS_ACTIVE.set(registry_stats.total_subscriptions as i64);
    for (topic, count) in &registry_stats.topics {
        metrics::TOPIC_SUBSCRIPTIONS
            .with_label_values(&[topic.as_str()])
            .set(*count as i64);
    }

    let stats = dispatcher.stats();
    metrics::SSE_STREAMS_ACTIVE.set(stats.streams_active as i64);
    metrics::WS_SESSIONS_ACTIVE.set(stats.sessions_active as i64);
}
