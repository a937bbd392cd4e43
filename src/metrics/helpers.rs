//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    BROADCASTS_TOTAL, BROADCAST_DELIVERED_TOTAL, BROADCAST_FANOUT, BROADCAST_PRUNED_TOTAL,
    LONGPOLL_DROPPED_TOTAL, LONGPOLL_OUTCOMES_TOTAL, LONGPOLL_PENDING, LONGPOLL_PUBLISHED_TOTAL,
    LONGPOLL_WAITERS, LONGPOLL_WAIT_SECONDS, MALFORMED_INPUT_TOTAL, POLL_REQUESTS_TOTAL,
    SSE_STREAMS_ACTIVE, SSE_STREAMS_CLOSED_TOTAL, SSE_STREAMS_OPENED_TOTAL, SSE_STREAM_DURATION,
    SSE_TICKS_SENT_TOTAL, STOMP_FRAMES_RECEIVED, SUBSCRIPTIONS_ACTIVE, TICKER_SUBSCRIPTIONS,
    TOPIC_SUBSCRIPTIONS, WS_SESSIONS_ACTIVE, WS_SESSION_DURATION,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording short-poll metrics
pub struct PollMetrics;

impl PollMetrics {
    pub fn record_request() {
        POLL_REQUESTS_TOTAL.inc();
    }
}

/// Helper struct for recording long-poll metrics
pub struct LongPollMetrics;

impl LongPollMetrics {
    pub fn waiter_started() {
        LONGPOLL_WAITERS.inc();
    }

    pub fn waiter_finished() {
        LONGPOLL_WAITERS.dec();
    }

    /// Record a waiter that received an event
    pub fn record_delivered(waited: Duration) {
        LONGPOLL_OUTCOMES_TOTAL.with_label_values(&["delivered"]).inc();
        LONGPOLL_WAIT_SECONDS.observe(waited.as_secs_f64());
    }

    /// Record a waiter that gave up
    pub fn record_timeout(waited: Duration) {
        LONGPOLL_OUTCOMES_TOTAL.with_label_values(&["timeout"]).inc();
        LONGPOLL_WAIT_SECONDS.observe(waited.as_secs_f64());
    }

    pub fn record_published() {
        LONGPOLL_PUBLISHED_TOTAL.inc();
    }

    pub fn record_dropped() {
        LONGPOLL_DROPPED_TOTAL.inc();
    }

    pub fn set_pending(pending: usize) {
        LONGPOLL_PENDING.set(pending as i64);
    }
}

/// Helper struct for recording SSE metrics
pub struct SseMetrics;

impl SseMetrics {
    pub fn stream_opened() {
        SSE_STREAMS_OPENED_TOTAL.inc();
        SSE_STREAMS_ACTIVE.inc();
    }

    pub fn stream_closed(lifetime: Duration) {
        SSE_STREAMS_CLOSED_TOTAL.inc();
        SSE_STREAMS_ACTIVE.dec();
        SSE_STREAM_DURATION.observe(lifetime.as_secs_f64());
    }

    pub fn record_tick() {
        SSE_TICKS_SENT_TOTAL.inc();
    }

    pub fn set_ticker_subscriptions(count: usize) {
        TICKER_SUBSCRIPTIONS.set(count as i64);
    }
}

/// Helper struct for recording WebSocket / pub-sub metrics
pub struct PubSubMetrics;

impl PubSubMetrics {
    pub fn session_opened() {
        WS_SESSIONS_ACTIVE.inc();
    }

    pub fn session_closed(lifetime: Duration) {
        WS_SESSIONS_ACTIVE.dec();
        WS_SESSION_DURATION.observe(lifetime.as_secs_f64());
    }

    /// Record a received STOMP frame
    pub fn record_frame(command: &str) {
        STOMP_FRAMES_RECEIVED.with_label_values(&[command]).inc();
    }

    pub fn subscription_added(topic: &str, topic_count: usize) {
        SUBSCRIPTIONS_ACTIVE.inc();
        TOPIC_SUBSCRIPTIONS
            .with_label_values(&[topic])
            .set(topic_count as i64);
    }

    pub fn subscriptions_removed(topic: &str, removed: usize, topic_count: usize) {
        SUBSCRIPTIONS_ACTIVE.sub(removed as i64);
        if topic_count == 0 {
            let _ = TOPIC_SUBSCRIPTIONS.remove_label_values(&[topic]);
        } else {
            TOPIC_SUBSCRIPTIONS
                .with_label_values(&[topic])
                .set(topic_count as i64);
        }
    }

    pub fn record_broadcast(delivered: usize, pruned: usize) {
        BROADCASTS_TOTAL.inc();
        BROADCAST_DELIVERED_TOTAL.inc_by(delivered as u64);
        BROADCAST_PRUNED_TOTAL.inc_by(pruned as u64);
        BROADCAST_FANOUT.observe(delivered as f64);
    }
}

/// Helper struct for recording rejected input
pub struct InputMetrics;

impl InputMetrics {
    pub fn record_malformed(surface: &str) {
        MALFORMED_INPUT_TOTAL.with_label_values(&[surface]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        PollMetrics::record_request();
        LongPollMetrics::record_timeout(Duration::from_millis(10));
        InputMetrics::record_malformed("http");

        let output = encode_metrics().unwrap();
        assert!(output.contains("push_poll_requests_total"));
        assert!(output.contains("push_longpoll_outcomes_total"));
        assert!(output.contains("push_malformed_input_total"));
    }
}
