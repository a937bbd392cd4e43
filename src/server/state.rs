use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::counter::Counter;
use crate::delivery::{DispatcherConfig, PushDispatcher};
use crate::queue::{EventQueue, QueueConfig};
use crate::registry::SubscriptionRegistry;
use crate::shutdown::{shutdown_channel, ShutdownSender};
use crate::ticker::Ticker;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub dispatcher: Arc<PushDispatcher>,
    /// Raised when the server starts shutting down
    pub shutdown: ShutdownSender,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let queue = Arc::new(EventQueue::new(QueueConfig::from(&settings.longpoll)));
        let dispatcher = Arc::new(PushDispatcher::new(
            Arc::new(Counter::new()),
            queue,
            Arc::new(Ticker::new()),
            Arc::new(SubscriptionRegistry::new()),
            DispatcherConfig::from(&settings),
        ));
        Self {
            settings: Arc::new(settings),
            dispatcher,
            shutdown: shutdown_channel(),
            start_time: Instant::now(),
        }
    }
}
