use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use thiserror::Error;

use crate::event::{Event, PayloadError};

/// Long-poll request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LongPollState {
    Waiting,
    Delivered,
    TimedOut,
}

/// What a long-poll request ends with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LongPollOutcome {
    Delivered(Event),
    TimedOut,
}

impl LongPollOutcome {
    pub fn state(&self) -> LongPollState {
        match self {
            Self::Delivered(_) => LongPollState::Delivered,
            Self::TimedOut => LongPollState::TimedOut,
        }
    }
}

/// SSE stream lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Open,
    Streaming,
    Closed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    MalformedInput(#[from] PayloadError),

    #[error("no handler for destination {0}")]
    UnknownDestination(String),
}

/// Statistics for the push dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub short_polls: AtomicU64,
    pub long_polls_delivered: AtomicU64,
    pub long_polls_timed_out: AtomicU64,
    pub events_published: AtomicU64,
    pub publishes_rejected: AtomicU64,
    pub streams_opened: AtomicU64,
    pub streams_active: AtomicUsize,
    pub streams_closed: AtomicU64,
    pub ticks_sent: AtomicU64,
    pub sessions_opened: AtomicU64,
    pub sessions_active: AtomicUsize,
    pub inbound_messages: AtomicU64,
    pub inbound_rejected: AtomicU64,
    pub broadcasts: AtomicU64,
    pub deliveries: AtomicU64,
    pub pruned: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            short_polls: self.short_polls.load(Ordering::Relaxed),
            long_polls_delivered: self.long_polls_delivered.load(Ordering::Relaxed),
            long_polls_timed_out: self.long_polls_timed_out.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            publishes_rejected: self.publishes_rejected.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            streams_active: self.streams_active.load(Ordering::Relaxed),
            streams_closed: self.streams_closed.load(Ordering::Relaxed),
            ticks_sent: self.ticks_sent.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            inbound_messages: self.inbound_messages.load(Ordering::Relaxed),
            inbound_rejected: self.inbound_rejected.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub short_polls: u64,
    pub long_polls_delivered: u64,
    pub long_polls_timed_out: u64,
    pub events_published: u64,
    pub publishes_rejected: u64,
    pub streams_opened: u64,
    pub streams_active: usize,
    pub streams_closed: u64,
    pub ticks_sent: u64,
    pub sessions_opened: u64,
    pub sessions_active: usize,
    pub inbound_messages: u64,
    pub inbound_rejected: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub pruned: u64,
}
