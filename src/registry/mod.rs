//! Topic subscription registry.
//!
//! The registry is the single owner of subscription lifetime. Each topic
//! keeps its subscribers in registration order; a broadcast copies that list
//! (cheap `Arc` clones) and delivers outside the lock, so concurrent
//! subscribe/unsubscribe calls never observe or cause a torn state.

mod sink;
mod types;

pub use sink::{EventSink, SinkError};
pub use types::{BroadcastResult, RegistryStats, SubscriptionHandle, TopicInfo};

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::event::Event;
use crate::metrics::PubSubMetrics;

#[derive(Clone)]
struct Subscriber {
    id: Uuid,
    sink: Arc<dyn EventSink>,
}

/// Manages all active topic subscriptions
pub struct SubscriptionRegistry {
    /// topic -> subscribers in registration order
    topics: DashMap<String, Vec<Subscriber>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Register a sink under a topic
    pub fn subscribe(&self, topic: impl Into<String>, sink: Arc<dyn EventSink>) -> SubscriptionHandle {
        let topic = topic.into();
        let id = Uuid::new_v4();

        let count = {
            let mut subscribers = self.topics.entry(topic.clone()).or_default();
            subscribers.push(Subscriber { id, sink });
            subscribers.len()
        };

        PubSubMetrics::subscription_added(&topic, count);
        tracing::debug!(subscription_id = %id, topic = %topic, subscribers = count, "Subscribed to topic");

        SubscriptionHandle { id, topic }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.remove_ids(&handle.topic, &[handle.id]);
        if removed > 0 {
            tracing::debug!(subscription_id = %handle.id, topic = %handle.topic, "Unsubscribed from topic");
        }
        removed > 0
    }

    /// Deliver an event to every sink registered on `topic` right now.
    ///
    /// Sinks that fail are pruned and never retried. Subscribers added while
    /// the broadcast runs are not part of it.
    pub fn broadcast(&self, topic: &str, event: Arc<Event>) -> BroadcastResult {
        let snapshot: Vec<Subscriber> = match self.topics.get(topic) {
            Some(subscribers) => subscribers.clone(),
            None => {
                tracing::debug!(topic = %topic, "Broadcast to topic without subscribers");
                PubSubMetrics::record_broadcast(0, 0);
                return BroadcastResult::default();
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for subscriber in &snapshot {
            match subscriber.sink.deliver(&event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        subscription_id = %subscriber.id,
                        topic = %topic,
                        error = %e,
                        "Pruning failed sink"
                    );
                    failed.push(subscriber.id);
                }
            }
        }

        let pruned = if failed.is_empty() {
            0
        } else {
            self.remove_ids(topic, &failed)
        };

        PubSubMetrics::record_broadcast(delivered, pruned);
        tracing::debug!(
            topic = %topic,
            sequence = event.sequence,
            subscribers = snapshot.len(),
            delivered = delivered,
            pruned = pruned,
            "Broadcast complete"
        );

        BroadcastResult {
            subscribers: snapshot.len(),
            delivered,
            pruned,
        }
    }

    /// Whether `handle` is still registered; false once unsubscribed or pruned
    pub fn is_subscribed(&self, handle: &SubscriptionHandle) -> bool {
        self.topics
            .get(&handle.topic)
            .map(|subscribers| subscribers.iter().any(|s| s.id == handle.id))
            .unwrap_or(false)
    }

    /// Number of subscribers on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// List all topics with at least one subscriber
    pub fn topics(&self) -> Vec<TopicInfo> {
        let mut topics: Vec<TopicInfo> = self
            .topics
            .iter()
            .map(|entry| TopicInfo {
                name: entry.key().clone(),
                subscriber_count: entry.value().len(),
            })
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        topics
    }

    pub fn stats(&self) -> RegistryStats {
        let mut topics = HashMap::new();
        let mut total_subscriptions = 0;
        for entry in self.topics.iter() {
            total_subscriptions += entry.value().len();
            topics.insert(entry.key().clone(), entry.value().len());
        }

        RegistryStats {
            total_subscriptions,
            topics,
        }
    }

    fn remove_ids(&self, topic: &str, ids: &[Uuid]) -> usize {
        let (removed, remaining) = match self.topics.get_mut(topic) {
            Some(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|s| !ids.contains(&s.id));
                (before - subscribers.len(), subscribers.len())
            }
            None => return 0,
        };

        // Clean up empty topics
        if remaining == 0 {
            self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());
        }
        if removed > 0 {
            PubSubMetrics::subscriptions_removed(topic, removed, remaining);
        }

        removed
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Records deliveries in order, optionally refusing them
    struct RecordingSink {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl EventSink for RecordingSink {
        fn deliver(&self, _event: &Arc<Event>) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Disconnected);
            }
            self.log.lock().unwrap().push(self.label);
            Ok(())
        }
    }

    fn channel_sink() -> (Arc<dyn EventSink>, mpsc::Receiver<Arc<Event>>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(tx), rx)
    }

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let registry = SubscriptionRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (sink, rx) = channel_sink();
            registry.subscribe("/topic/greetings", sink);
            receivers.push(rx);
        }

        let result = registry.broadcast("/topic/greetings", Arc::new(Event::new("Hello: World")));
        assert_eq!(result.delivered, 3);
        assert_eq!(result.pruned, 0);

        for mut rx in receivers {
            assert_eq!(rx.try_recv().unwrap().payload, "Hello: World");
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_broadcast_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for label in ["a", "b", "c"] {
            registry.subscribe(
                "t",
                Arc::new(RecordingSink {
                    label,
                    log: log.clone(),
                    fail: false,
                }),
            );
        }

        registry.broadcast("t", Arc::new(Event::new("x")));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribed_before_broadcast_receives_nothing() {
        let registry = SubscriptionRegistry::new();
        let (sink_a, mut rx_a) = channel_sink();
        let (sink_b, mut rx_b) = channel_sink();
        let handle_a = registry.subscribe("t", sink_a);
        registry.subscribe("t", sink_b);

        assert!(registry.unsubscribe(&handle_a));
        assert!(!registry.unsubscribe(&handle_a));

        let result = registry.broadcast("t", Arc::new(Event::new("x")));
        assert_eq!(result.delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_is_subscribed_tracks_pruning() {
        let registry = SubscriptionRegistry::new();
        let (sink, rx) = channel_sink();
        let handle = registry.subscribe("t", sink);
        assert!(registry.is_subscribed(&handle));

        drop(rx);
        registry.broadcast("t", Arc::new(Event::new("x")));
        assert!(!registry.is_subscribed(&handle));
    }

    #[test]
    fn test_subscribed_after_broadcast_receives_nothing() {
        let registry = SubscriptionRegistry::new();
        let (early, mut rx_early) = channel_sink();
        registry.subscribe("t", early);

        registry.broadcast("t", Arc::new(Event::new("x")));

        let (late, mut rx_late) = channel_sink();
        registry.subscribe("t", late);

        assert!(rx_early.try_recv().is_ok());
        assert!(rx_late.try_recv().is_err());
    }

    #[test]
    fn test_failed_sinks_are_pruned_without_blocking_others() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(
            "t",
            Arc::new(RecordingSink {
                label: "broken",
                log: log.clone(),
                fail: true,
            }),
        );
        registry.subscribe(
            "t",
            Arc::new(RecordingSink {
                label: "healthy",
                log: log.clone(),
                fail: false,
            }),
        );

        let result = registry.broadcast("t", Arc::new(Event::new("x")));
        assert_eq!(result.subscribers, 2);
        assert_eq!(result.delivered, 1);
        assert_eq!(result.pruned, 1);
        assert_eq!(registry.subscriber_count("t"), 1);

        // The pruned sink is not retried
        let result = registry.broadcast("t", Arc::new(Event::new("y")));
        assert_eq!(result.subscribers, 1);
        assert_eq!(*log.lock().unwrap(), vec!["healthy", "healthy"]);
    }

    #[test]
    fn test_slow_sink_is_pruned() {
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::channel::<Arc<Event>>(1);
        registry.subscribe("t", Arc::new(tx));

        assert_eq!(registry.broadcast("t", Arc::new(Event::new("1"))).delivered, 1);
        let result = registry.broadcast("t", Arc::new(Event::new("2")));
        assert_eq!(result.pruned, 1);
        assert_eq!(registry.subscriber_count("t"), 0);
        assert!(registry.topics().is_empty());
    }

    #[test]
    fn test_broadcast_to_empty_topic() {
        let registry = SubscriptionRegistry::new();
        let result = registry.broadcast("nobody", Arc::new(Event::new("x")));
        assert_eq!(result, BroadcastResult::default());
    }

    #[test]
    fn test_stats_and_topics() {
        let registry = SubscriptionRegistry::new();
        let (a, _rx_a) = channel_sink();
        let (b, _rx_b) = channel_sink();
        let (c, _rx_c) = channel_sink();
        registry.subscribe("/topic/a", a);
        registry.subscribe("/topic/a", b);
        let handle = registry.subscribe("/topic/b", c);

        let stats = registry.stats();
        assert_eq!(stats.total_subscriptions, 3);
        assert_eq!(stats.topics.get("/topic/a"), Some(&2));

        registry.unsubscribe(&handle);
        let topics = registry.topics();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].name, "/topic/a");
        assert_eq!(topics[0].subscriber_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_and_broadcast() {
        let registry = Arc::new(SubscriptionRegistry::new());

        let subscribers: Vec<_> = (0..50)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let (tx, rx) = mpsc::unbounded_channel::<Arc<Event>>();
                    let handle = registry.subscribe("t", Arc::new(tx));
                    (handle, rx)
                })
            })
            .collect();

        let broadcasters: Vec<_> = (0..10)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.broadcast("t", Arc::new(Event::new(format!("{}", i)))) })
            })
            .collect();

        let mut handles = Vec::new();
        for task in subscribers {
            handles.push(task.await.unwrap());
        }
        for task in broadcasters {
            let result = task.await.unwrap();
            assert_eq!(result.pruned, 0);
            assert_eq!(result.delivered, result.subscribers);
        }

        assert_eq!(registry.subscriber_count("t"), 50);
        for (handle, _rx) in &handles {
            assert!(registry.unsubscribe(handle));
        }
        assert_eq!(registry.subscriber_count("t"), 0);
    }
}
