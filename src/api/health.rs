//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::delivery::DispatcherStatsSnapshot;
use crate::queue::QueueStats;
use crate::registry::TopicInfo;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub polling: PollingStats,
    pub longpoll: QueueStats,
    pub sse: SseStats,
    pub pubsub: PubSubStats,
    pub dispatcher: DispatcherStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct PollingStats {
    /// Value the next short poll will return
    pub next_value: u64,
}

#[derive(Debug, Serialize)]
pub struct SseStats {
    pub active_streams: usize,
    pub ticker_subscriptions: usize,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct PubSubStats {
    pub total_subscriptions: usize,
    pub active_sessions: usize,
    pub topics: Vec<TopicInfo>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let dispatcher = &state.dispatcher;
    let dispatcher_stats = dispatcher.stats();
    let registry_stats = dispatcher.registry().stats();

    Json(StatsResponse {
        polling: PollingStats {
            next_value: dispatcher.counter().peek(),
        },
        longpoll: dispatcher.queue().stats(),
        sse: SseStats {
            active_streams: dispatcher_stats.streams_active,
            ticker_subscriptions: dispatcher.ticker().active_subscriptions(),
            tick_interval_ms: state.settings.sse.tick_interval_ms,
        },
        pubsub: PubSubStats {
            total_subscriptions: registry_stats.total_subscriptions,
            active_sessions: dispatcher_stats.sessions_active,
            topics: dispatcher.registry().topics(),
        },
        dispatcher: dispatcher_stats,
    })
}
