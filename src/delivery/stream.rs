//! SSE tick stream with lifecycle tracking.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{BoxStream, StreamExt};
use uuid::Uuid;

use crate::metrics::SseMetrics;
use crate::shutdown::{shutdown_requested, ShutdownReceiver};
use crate::ticker::TickSubscription;

use super::{DispatcherStats, StreamState};

/// Rendered ticks for one SSE client
pub type TickEventStream = BoxStream<'static, String>;

/// Forward ticks until the client goes away or the server shuts down.
///
/// A stream opened after shutdown was requested closes without ticking.
/// Dropping the returned stream is the client-disconnect path: the guard and
/// the ticker subscription are released with it.
pub(super) fn tick_stream(
    ticks: TickSubscription,
    mut shutdown: ShutdownReceiver,
    stats: Arc<DispatcherStats>,
) -> TickEventStream {
    let mut guard = StreamGuard::open(stats);

    async_stream::stream! {
        let mut ticks = ticks;
        guard.transition(StreamState::Streaming);

        loop {
            let tick = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    tracing::debug!(stream_id = %guard.id, "SSE stream closed by server shutdown");
                    break;
                }
                tick = ticks.tick() => tick,
            };

            guard.record_tick();
            yield tick.to_string();
        }
    }
    .boxed()
}

/// Tracks one stream through OPEN -> STREAMING -> CLOSED
struct StreamGuard {
    id: Uuid,
    state: StreamState,
    opened_at: Instant,
    ticks: u64,
    stats: Arc<DispatcherStats>,
}

impl StreamGuard {
    fn open(stats: Arc<DispatcherStats>) -> Self {
        stats.streams_opened.fetch_add(1, Ordering::Relaxed);
        stats.streams_active.fetch_add(1, Ordering::Relaxed);
        SseMetrics::stream_opened();

        let id = Uuid::new_v4();
        tracing::info!(stream_id = %id, "SSE stream opened");

        Self {
            id,
            state: StreamState::Open,
            opened_at: Instant::now(),
            ticks: 0,
            stats,
        }
    }

    fn transition(&mut self, next: StreamState) {
        tracing::debug!(stream_id = %self.id, from = ?self.state, to = ?next, "SSE stream state change");
        self.state = next;
    }

    fn record_tick(&mut self) {
        self.ticks += 1;
        self.stats.ticks_sent.fetch_add(1, Ordering::Relaxed);
        SseMetrics::record_tick();
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.transition(StreamState::Closed);
        self.stats.streams_active.fetch_sub(1, Ordering::Relaxed);
        self.stats.streams_closed.fetch_add(1, Ordering::Relaxed);

        let lifetime = self.opened_at.elapsed();
        SseMetrics::stream_closed(lifetime);

        tracing::info!(
            stream_id = %self.id,
            ticks = self.ticks,
            duration_secs = lifetime.as_secs_f64(),
            "SSE stream closed"
        );
    }
}
