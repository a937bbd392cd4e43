use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{PubSubConfig, Settings};
use crate::counter::Counter;
use crate::event::{validate_payload, validate_text, Event};
use crate::metrics::{InputMetrics, LongPollMetrics, PollMetrics, PubSubMetrics};
use crate::queue::{EventQueue, QueueError};
use crate::registry::{BroadcastResult, SubscriptionRegistry};
use crate::shutdown::ShutdownReceiver;
use crate::ticker::Ticker;

use super::stream::{tick_stream, TickEventStream};
use super::{DispatchError, DispatcherStats, DispatcherStatsSnapshot, LongPollOutcome, LongPollState};

/// Longest topic name accepted on the broker
const MAX_TOPIC_LEN: usize = 128;

/// Tunables for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub tick_interval: Duration,
    pub max_payload_bytes: usize,
    pub pubsub: PubSubConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            max_payload_bytes: 64 * 1024,
            pubsub: PubSubConfig::default(),
        }
    }
}

impl From<&Settings> for DispatcherConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            tick_interval: settings.sse.tick_interval(),
            max_payload_bytes: settings.longpoll.max_payload_bytes,
            pubsub: settings.pubsub.clone(),
        }
    }
}

/// Composes counter, queue, ticker and registry into the four delivery modes
pub struct PushDispatcher {
    counter: Arc<Counter>,
    queue: Arc<EventQueue>,
    ticker: Arc<Ticker>,
    registry: Arc<SubscriptionRegistry>,
    config: DispatcherConfig,
    stats: Arc<DispatcherStats>,
}

impl PushDispatcher {
    pub fn new(
        counter: Arc<Counter>,
        queue: Arc<EventQueue>,
        ticker: Arc<Ticker>,
        registry: Arc<SubscriptionRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            counter,
            queue,
            ticker,
            registry,
            config,
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    pub fn counter(&self) -> &Arc<Counter> {
        &self.counter
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn ticker(&self) -> &Arc<Ticker> {
        &self.ticker
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    // ------------------------------------------------------------------
    // Short polling
    // ------------------------------------------------------------------

    /// Stateless: hand out the next counter value, rendered as text
    pub fn short_poll(&self) -> String {
        let value = self.counter.next();
        self.stats.short_polls.fetch_add(1, Ordering::Relaxed);
        PollMetrics::record_request();
        tracing::debug!(value = value, "Short poll served");
        format!("Value: {}", value)
    }

    // ------------------------------------------------------------------
    // Long polling
    // ------------------------------------------------------------------

    /// Wait for the next published event, or time out
    #[tracing::instrument(name = "dispatcher.long_poll", skip(self))]
    pub async fn long_poll(&self) -> LongPollOutcome {
        let started = Instant::now();
        tracing::debug!(state = ?LongPollState::Waiting, waiters = self.queue.waiters(), "Long poll waiting");

        let outcome = match self.queue.take().await {
            Ok(event) => {
                self.stats.long_polls_delivered.fetch_add(1, Ordering::Relaxed);
                LongPollMetrics::record_delivered(started.elapsed());
                LongPollOutcome::Delivered(event)
            }
            Err(QueueError::Timeout(timeout)) => {
                self.stats.long_polls_timed_out.fetch_add(1, Ordering::Relaxed);
                LongPollMetrics::record_timeout(started.elapsed());
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Long poll timed out");
                LongPollOutcome::TimedOut
            }
        };

        tracing::debug!(
            state = ?outcome.state(),
            waited_ms = started.elapsed().as_millis() as u64,
            "Long poll finished"
        );
        outcome
    }

    /// Validate a raw body and hand it to the long-poll queue.
    ///
    /// Returns the sequence number of the queued event.
    pub fn publish(&self, body: &[u8]) -> Result<u64, DispatchError> {
        let payload = match validate_payload(body, self.config.max_payload_bytes) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.publishes_rejected.fetch_add(1, Ordering::Relaxed);
                InputMetrics::record_malformed("http");
                return Err(e.into());
            }
        };

        let event = Event::new(payload);
        let sequence = event.sequence;
        self.queue.publish(event);
        self.stats.events_published.fetch_add(1, Ordering::Relaxed);

        tracing::info!(sequence = sequence, bytes = body.len(), "Event published for long poll");
        Ok(sequence)
    }

    // ------------------------------------------------------------------
    // Server-sent events
    // ------------------------------------------------------------------

    /// Open a tick stream for one SSE client.
    ///
    /// The stream ends once the `shutdown` flag is raised; dropping it
    /// releases the ticker.
    pub fn open_stream(&self, shutdown: ShutdownReceiver) -> TickEventStream {
        let ticks = self.ticker.subscribe(self.config.tick_interval);
        tick_stream(ticks, shutdown, self.stats.clone())
    }

    // ------------------------------------------------------------------
    // Pub/Sub
    // ------------------------------------------------------------------

    /// Route an inbound message to its topic and broadcast it.
    ///
    /// The greeting destination wraps the payload with the greeting prefix
    /// and publishes on the greeting topic. Broker destinations are
    /// broadcast unchanged.
    #[tracing::instrument(name = "dispatcher.inbound", skip(self, payload), fields(bytes = payload.len()))]
    pub fn handle_inbound(&self, destination: &str, payload: &str) -> Result<BroadcastResult, DispatchError> {
        if let Err(e) = validate_text(payload, self.config.pubsub.max_frame_bytes) {
            self.stats.inbound_rejected.fetch_add(1, Ordering::Relaxed);
            InputMetrics::record_malformed("stomp");
            return Err(e.into());
        }

        let pubsub = &self.config.pubsub;
        let (topic, body) = if destination == pubsub.greeting_destination {
            tracing::info!(message = %payload, "Received greeting");
            (pubsub.greeting_topic.as_str(), format!("{}{}", pubsub.greeting_prefix, payload))
        } else if self.is_broker_destination(destination) {
            (destination, payload.to_string())
        } else {
            self.stats.inbound_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(DispatchError::UnknownDestination(destination.to_string()));
        };

        self.stats.inbound_messages.fetch_add(1, Ordering::Relaxed);
        let result = self.registry.broadcast(topic, Arc::new(Event::new(body)));

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats.deliveries.fetch_add(result.delivered as u64, Ordering::Relaxed);
        self.stats.pruned.fetch_add(result.pruned as u64, Ordering::Relaxed);

        tracing::debug!(
            topic = %topic,
            delivered = result.delivered,
            pruned = result.pruned,
            "Inbound message broadcast"
        );
        Ok(result)
    }

    /// Whether `destination` names a topic on the in-memory broker.
    ///
    /// Segments after the broker prefix may use alphanumerics, dash,
    /// underscore, dot and slash.
    pub fn is_broker_destination(&self, destination: &str) -> bool {
        let prefix = self.config.pubsub.broker_prefix.trim_end_matches('/');
        let Some(rest) = destination.strip_prefix(prefix) else {
            return false;
        };
        let Some(name) = rest.strip_prefix('/') else {
            return false;
        };

        !name.is_empty()
            && destination.len() <= MAX_TOPIC_LEN
            && !name.ends_with('/')
            && !name.contains("//")
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    }

    /// Track a pub/sub client session for as long as the guard lives
    pub fn open_session(&self) -> SessionGuard {
        self.stats.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.stats.sessions_active.fetch_add(1, Ordering::Relaxed);
        PubSubMetrics::session_opened();
        SessionGuard {
            opened_at: Instant::now(),
            stats: self.stats.clone(),
        }
    }
}

/// Counts a live pub/sub session; dropping it records the close
pub struct SessionGuard {
    opened_at: Instant,
    stats: Arc<DispatcherStats>,
}

impl SessionGuard {
    pub fn lifetime(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.stats.sessions_active.fetch_sub(1, Ordering::Relaxed);
        PubSubMetrics::session_closed(self.opened_at.elapsed());
    }
}
