//! Prometheus metrics for the push service.
//!
//! - Short polling request counts
//! - Long-poll waiters, outcomes, wait time and the pending buffer
//! - SSE streams and ticks
//! - WebSocket sessions, STOMP frames, subscriptions and broadcast fan-out
//! - Rejected input per surface

mod helpers;

pub use helpers::{
    encode_metrics, InputMetrics, LongPollMetrics, PollMetrics, PubSubMetrics, SseMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "push";

lazy_static! {
    // ============================================================================
    // Short Polling Metrics
    // ============================================================================

    /// Total short-poll requests served
    pub static ref POLL_REQUESTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_poll_requests_total", METRIC_PREFIX),
        "Total short-poll requests served"
    ).unwrap();

    // ============================================================================
    // Long Polling Metrics
    // ============================================================================

    /// Requests currently waiting for an event
    pub static ref LONGPOLL_WAITERS: IntGauge = register_int_gauge!(
        format!("{}_longpoll_waiters", METRIC_PREFIX),
        "Number of long-poll requests currently waiting"
    ).unwrap();

    /// Completed long-poll requests by outcome (delivered, timeout)
    pub static ref LONGPOLL_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_longpoll_outcomes_total", METRIC_PREFIX),
        "Completed long-poll requests by outcome",
        &["outcome"]
    ).unwrap();

    /// Time a long-poll request spent waiting
    pub static ref LONGPOLL_WAIT_SECONDS: Histogram = register_histogram!(
        format!("{}_longpoll_wait_seconds", METRIC_PREFIX),
        "Time long-poll requests spent waiting in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Events published for long-poll delivery
    pub static ref LONGPOLL_PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_longpoll_published_total", METRIC_PREFIX),
        "Total events published for long-poll delivery"
    ).unwrap();

    /// Events waiting for a long-poll request
    pub static ref LONGPOLL_PENDING: IntGauge = register_int_gauge!(
        format!("{}_longpoll_pending", METRIC_PREFIX),
        "Events buffered until a long-poll request arrives"
    ).unwrap();

    /// Pending events dropped because the buffer was full
    pub static ref LONGPOLL_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_longpoll_dropped_total", METRIC_PREFIX),
        "Total pending events dropped from a full buffer"
    ).unwrap();

    // ============================================================================
    // SSE Metrics
    // ============================================================================

    /// Currently open SSE streams
    pub static ref SSE_STREAMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_sse_streams_active", METRIC_PREFIX),
        "Number of open SSE streams"
    ).unwrap();

    /// SSE streams opened
    pub static ref SSE_STREAMS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sse_streams_opened_total", METRIC_PREFIX),
        "Total SSE streams opened"
    ).unwrap();

    /// SSE streams closed
    pub static ref SSE_STREAMS_CLOSED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sse_streams_closed_total", METRIC_PREFIX),
        "Total SSE streams closed"
    ).unwrap();

    /// SSE stream lifetime
    pub static ref SSE_STREAM_DURATION: Histogram = register_histogram!(
        format!("{}_sse_stream_duration_seconds", METRIC_PREFIX),
        "SSE stream lifetime in seconds",
        vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
    ).unwrap();

    /// Ticks written to SSE streams
    pub static ref SSE_TICKS_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sse_ticks_sent_total", METRIC_PREFIX),
        "Total ticks written to SSE streams"
    ).unwrap();

    /// Live ticker subscriptions
    pub static ref TICKER_SUBSCRIPTIONS: IntGauge = register_int_gauge!(
        format!("{}_ticker_subscriptions", METRIC_PREFIX),
        "Number of live ticker subscriptions"
    ).unwrap();

    // ============================================================================
    // Pub/Sub Metrics
    // ============================================================================

    /// Open WebSocket sessions
    pub static ref WS_SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_ws_sessions_active", METRIC_PREFIX),
        "Number of open WebSocket sessions"
    ).unwrap();

    /// WebSocket session lifetime
    pub static ref WS_SESSION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_session_duration_seconds", METRIC_PREFIX),
        "WebSocket session lifetime in seconds",
        vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
    ).unwrap();

    /// STOMP frames received by command
    pub static ref STOMP_FRAMES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_stomp_frames_received_total", METRIC_PREFIX),
        "Total STOMP frames received by command",
        &["command"]
    ).unwrap();

    /// Active topic subscriptions
    pub static ref SUBSCRIPTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_subscriptions_active", METRIC_PREFIX),
        "Number of active topic subscriptions"
    ).unwrap();

    /// Subscriptions per topic
    pub static ref TOPIC_SUBSCRIPTIONS: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_topic_subscriptions", METRIC_PREFIX),
        "Number of subscriptions per topic",
        &["topic"]
    ).unwrap();

    /// Broadcasts performed
    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcasts performed"
    ).unwrap();

    /// Broadcast deliveries accepted by sinks
    pub static ref BROADCAST_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcast_delivered_total", METRIC_PREFIX),
        "Total broadcast deliveries accepted by sinks"
    ).unwrap();

    /// Sinks pruned after a failed delivery
    pub static ref BROADCAST_PRUNED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcast_pruned_total", METRIC_PREFIX),
        "Total sinks pruned after a failed delivery"
    ).unwrap();

    /// Subscribers reached per broadcast
    pub static ref BROADCAST_FANOUT: Histogram = register_histogram!(
        format!("{}_broadcast_fanout", METRIC_PREFIX),
        "Subscribers reached per broadcast",
        vec![0.0, 1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0]
    ).unwrap();

    // ============================================================================
    // Input Metrics
    // ============================================================================

    /// Payloads rejected at the boundary, by surface (http, stomp)
    pub static ref MALFORMED_INPUT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_malformed_input_total", METRIC_PREFIX),
        "Total payloads rejected at the boundary",
        &["surface"]
    ).unwrap();
}
