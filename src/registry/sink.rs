//! Delivery sinks: anything a broadcast event can be pushed into.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::Event;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The receiving side is gone (client disconnected)
    #[error("sink disconnected")]
    Disconnected,
    /// The receiving side is not keeping up
    #[error("sink buffer full")]
    Full,
}

/// A place an event can be delivered to.
///
/// Delivery must not wait: a sink that cannot accept the event right now
/// reports an error and gets pruned by the registry.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &Arc<Event>) -> Result<(), SinkError>;
}

impl EventSink for mpsc::Sender<Arc<Event>> {
    fn deliver(&self, event: &Arc<Event>) -> Result<(), SinkError> {
        self.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Disconnected,
        })
    }
}

impl EventSink for mpsc::UnboundedSender<Arc<Event>> {
    fn deliver(&self, event: &Arc<Event>) -> Result<(), SinkError> {
        self.send(event.clone()).map_err(|_| SinkError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_sender_reports_full() {
        let (tx, _rx) = mpsc::channel::<Arc<Event>>(1);
        let event = Arc::new(Event::new("x"));

        assert!(tx.deliver(&event).is_ok());
        assert_eq!(tx.deliver(&event), Err(SinkError::Full));
    }

    #[test]
    fn test_bounded_sender_reports_disconnected() {
        let (tx, rx) = mpsc::channel::<Arc<Event>>(1);
        drop(rx);
        let event = Arc::new(Event::new("x"));
        assert_eq!(tx.deliver(&event), Err(SinkError::Disconnected));
    }

    #[test]
    fn test_unbounded_sender_reports_disconnected() {
        let (tx, rx) = mpsc::unbounded_channel::<Arc<Event>>();
        let event = Arc::new(Event::new("x"));
        assert!(tx.deliver(&event).is_ok());
        drop(rx);
        assert_eq!(tx.deliver(&event), Err(SinkError::Disconnected));
    }
}
