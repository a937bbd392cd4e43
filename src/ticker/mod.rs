//! Periodic tick source for the SSE stream.
//!
//! Each subscription owns its own tokio interval, so a slow consumer only
//! delays itself. Dropping a [`TickSubscription`] (or calling
//! [`TickSubscription::unsubscribe`]) releases the timer.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::metrics::SseMetrics;

/// One elapsed interval. Rendered lazily at delivery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub index: u64,
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tick: {}", self.index)
    }
}

/// Hands out independent tick subscriptions and tracks how many are live
#[derive(Debug, Default)]
pub struct Ticker {
    active: Arc<AtomicUsize>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a tick sequence whose first tick fires one `period` from now.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero; configuration validation rejects that earlier.
    pub fn subscribe(&self, period: Duration) -> TickSubscription {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        SseMetrics::set_ticker_subscriptions(active);
        tracing::debug!(period_ms = period.as_millis() as u64, active = active, "Ticker subscribed");

        TickSubscription {
            interval,
            next_index: 0,
            active: self.active.clone(),
        }
    }

    /// Number of subscriptions that have not been released yet
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// An infinite, non-restartable sequence of ticks
#[derive(Debug)]
pub struct TickSubscription {
    interval: Interval,
    next_index: u64,
    active: Arc<AtomicUsize>,
}

impl TickSubscription {
    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Wait for the next tick
    pub async fn tick(&mut self) -> Tick {
        self.interval.tick().await;
        self.advance()
    }

    /// Stop receiving ticks and release the timer
    pub fn unsubscribe(self) {}

    fn advance(&mut self) -> Tick {
        let tick = Tick {
            index: self.next_index,
        };
        self.next_index += 1;
        tick
    }
}

impl Stream for TickSubscription {
    type Item = Tick;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.interval.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(Some(this.advance())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TickSubscription {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        SseMetrics::set_ticker_subscriptions(remaining);
        tracing::debug!(
            ticks_emitted = self.next_index,
            active = remaining,
            "Ticker subscription released"
        );
    }
}
