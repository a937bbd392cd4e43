//! Long-polling event queue.
//!
//! A FIFO hand-off between producers and suspended
//! waiters. Producers never block; waiters park on a [`Notify`] continuation
//! instead of a thread, and give up with [`QueueError::Timeout`] once the
//! configured wait elapses.
//!
//! Events published while nobody is waiting are buffered up to
//! `max_pending`. Beyond that the oldest pending event is dropped, the same
//! way a full per-user offline queue drops its oldest message.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;

use crate::config::LongPollConfig;
use crate::event::Event;
use crate::metrics::LongPollMetrics;

/// Configuration for the event queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long `take` waits before giving up
    pub timeout: Duration,
    /// Maximum number of events buffered without a waiter
    pub max_pending: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_pending: 1000,
        }
    }
}

impl From<&LongPollConfig> for QueueConfig {
    fn from(config: &LongPollConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_pending: config.max_pending,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("no event arrived within {0:?}")]
    Timeout(Duration),
}

/// Snapshot of queue state
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub waiters: usize,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub max_pending: usize,
}

pub struct EventQueue {
    pending: Mutex<VecDeque<Event>>,
    available: Notify,
    config: QueueConfig,
    waiters: AtomicUsize,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            config,
            waiters: AtomicUsize::new(0),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Append an event to the tail. Never blocks.
    pub fn publish(&self, event: Event) {
        let sequence = event.sequence;
        let pending = {
            let mut queue = self.lock();
            if queue.len() >= self.config.max_pending {
                if let Some(dropped) = queue.pop_front() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    LongPollMetrics::record_dropped();
                    tracing::warn!(
                        dropped_sequence = dropped.sequence,
                        max_pending = self.config.max_pending,
                        "Dropped oldest pending event from full queue"
                    );
                }
            }
            queue.push_back(event);
            queue.len()
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        LongPollMetrics::record_published();
        LongPollMetrics::set_pending(pending);
        self.available.notify_one();

        tracing::debug!(sequence = sequence, pending = pending, "Event published");
    }

    /// Remove the head, waiting up to the configured timeout
    pub async fn take(&self) -> Result<Event, QueueError> {
        self.take_within(self.config.timeout).await
    }

    /// Remove the head, waiting up to `timeout`.
    ///
    /// Cancelling the returned future (for example when the client goes
    /// away) never consumes an event.
    pub async fn take_within(&self, timeout: Duration) -> Result<Event, QueueError> {
        let _waiter = WaiterGuard::new(&self.waiters);
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.next_event()).await {
            Ok(event) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    sequence = event.sequence,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Event handed to waiter"
                );
                Ok(event)
            }
            Err(_) => Err(QueueError::Timeout(timeout)),
        }
    }

    async fn next_event(&self) -> Event {
        loop {
            // Register interest before checking, so a publish in between is not missed
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.pop() {
                return event;
            }

            notified.await;
        }
    }

    fn pop(&self) -> Option<Event> {
        let mut queue = self.lock();
        let event = queue.pop_front();
        if event.is_some() {
            LongPollMetrics::set_pending(queue.len());
        }
        event
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of callers currently suspended in `take`
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.len(),
            waiters: self.waiters(),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped(),
            max_pending: self.config.max_pending,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        // Queue operations cannot leave the deque half-updated, so a poisoned lock is still usable
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

/// Keeps the waiter count accurate even when the waiting future is dropped
struct WaiterGuard<'a> {
    waiters: &'a AtomicUsize,
}

impl<'a> WaiterGuard<'a> {
    fn new(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::Relaxed);
        LongPollMetrics::waiter_started();
        Self { waiters }
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::Relaxed);
        LongPollMetrics::waiter_finished();
    }
}
