//! Subscription handles and registry statistics

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

/// Returned by `subscribe`; the only way to remove a subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub topic: String,
}

/// Outcome of a single broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastResult {
    /// Subscribers present in the snapshot
    pub subscribers: usize,
    /// Sinks that accepted the event
    pub delivered: usize,
    /// Sinks that failed and were removed
    pub pruned: usize,
}

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_subscriptions: usize,
    pub topics: HashMap<String, usize>,
}

/// Topic information
#[derive(Debug, Clone, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub subscriber_count: usize,
}
