//! Per-connection STOMP session state.
//!
//! The session owns the registry subscriptions opened on its connection and
//! releases all of them when it is closed or dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::delivery::{DispatchError, PushDispatcher};
use crate::event::Event;
use crate::metrics::PubSubMetrics;
use crate::registry::{EventSink, SinkError, SubscriptionHandle};

use super::frame::{Command, Frame};

/// Protocol versions this server speaks, best first
const SUPPORTED_VERSIONS: [&str; 3] = ["1.2", "1.1", "1.0"];

/// Whether the connection should stay open after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    Continue,
    Close,
}

/// Frames to send back plus what to do with the connection
#[derive(Debug)]
pub struct SessionReply {
    pub frames: Vec<Frame>,
    pub control: SessionControl,
}

impl SessionReply {
    fn none() -> Self {
        Self {
            frames: Vec::new(),
            control: SessionControl::Continue,
        }
    }

    fn frame(frame: Frame) -> Self {
        Self {
            frames: vec![frame],
            control: SessionControl::Continue,
        }
    }

    /// ERROR must be followed by closing the connection
    fn error(message: impl Into<String>, detail: impl Into<String>, receipt: Option<&str>) -> Self {
        let mut frame = Frame::error(message, detail);
        if let Some(receipt) = receipt {
            frame = frame.header("receipt-id", receipt);
        }
        Self {
            frames: vec![frame],
            control: SessionControl::Close,
        }
    }

    fn with_receipt(mut self, receipt: Option<&str>) -> Self {
        if let Some(receipt) = receipt {
            self.frames.push(Frame::receipt(receipt));
        }
        self
    }
}

/// Delivers broadcast events as MESSAGE frames on one STOMP subscription
struct SubscriptionSink {
    subscription: String,
    destination: String,
    session_id: Uuid,
    message_ids: Arc<AtomicU64>,
    outbound: mpsc::Sender<Frame>,
}

impl EventSink for SubscriptionSink {
    fn deliver(&self, event: &Arc<Event>) -> Result<(), SinkError> {
        let message_id = self.message_ids.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(Command::Message)
            .header("subscription", self.subscription.as_str())
            .header("message-id", format!("{}-{}", self.session_id.simple(), message_id))
            .header("destination", self.destination.as_str())
            .header("content-type", "text/plain;charset=UTF-8")
            .with_body(event.payload());

        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Disconnected,
        })
    }
}

pub struct StompSession {
    id: Uuid,
    dispatcher: Arc<PushDispatcher>,
    outbound: mpsc::Sender<Frame>,
    connected: bool,
    /// STOMP subscription id -> registry handle
    subscriptions: HashMap<String, SubscriptionHandle>,
    message_ids: Arc<AtomicU64>,
}

impl StompSession {
    /// `outbound` feeds the connection writer; MESSAGE frames for this
    /// session's subscriptions are pushed into it by the registry.
    pub fn new(dispatcher: Arc<PushDispatcher>, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dispatcher,
            outbound,
            connected: false,
            subscriptions: HashMap::new(),
            message_ids: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Parse and handle one WebSocket text message
    pub fn handle_text(&mut self, text: &str) -> SessionReply {
        let max = self.dispatcher.config().pubsub.max_frame_bytes;
        if text.len() > max {
            return SessionReply::error(
                "Frame too large",
                format!("frame of {} bytes exceeds the limit of {} bytes", text.len(), max),
                None,
            );
        }

        match Frame::parse(text) {
            Ok(Some(frame)) => self.handle_frame(frame),
            // Heart-beat
            Ok(None) => SessionReply::none(),
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Failed to parse STOMP frame");
                SessionReply::error("Malformed frame", e.to_string(), None)
            }
        }
    }

    pub fn handle_frame(&mut self, frame: Frame) -> SessionReply {
        PubSubMetrics::record_frame(frame.command.as_str());
        self.forget_pruned();

        let receipt = frame.get("receipt").map(str::to_string);
        let receipt = receipt.as_deref();

        if !self.connected && !matches!(frame.command, Command::Connect | Command::Stomp) {
            return SessionReply::error(
                "Not connected",
                format!("{} received before CONNECT", frame.command),
                receipt,
            );
        }

        match frame.command {
            Command::Connect | Command::Stomp => self.handle_connect(&frame),
            Command::Subscribe => self.handle_subscribe(&frame, receipt),
            Command::Unsubscribe => self.handle_unsubscribe(&frame, receipt),
            Command::Send => self.handle_send(frame.get("destination"), &frame.body, receipt),
            // Subscriptions are auto-acknowledged
            Command::Ack | Command::Nack => SessionReply::none().with_receipt(receipt),
            Command::Begin | Command::Commit | Command::Abort => SessionReply::error(
                "Transactions are not supported",
                format!("{} is not supported by this broker", frame.command),
                receipt,
            ),
            Command::Disconnect => {
                tracing::debug!(session_id = %self.id, "Client sent DISCONNECT");
                SessionReply {
                    frames: Vec::new(),
                    control: SessionControl::Close,
                }
                .with_receipt(receipt)
            }
            Command::Connected | Command::Message | Command::Receipt | Command::Error => {
                SessionReply::error(
                    "Unexpected frame",
                    format!("{} is a server frame", frame.command),
                    receipt,
                )
            }
        }
    }

    fn handle_connect(&mut self, frame: &Frame) -> SessionReply {
        if self.connected {
            return SessionReply::error("Already connected", "CONNECT sent twice", None);
        }

        let version = match negotiate_version(frame.get("accept-version")) {
            Some(version) => version,
            None => {
                return SessionReply::error(
                    "Unsupported protocol version",
                    format!("Supported protocol versions are {}", SUPPORTED_VERSIONS.join(",")),
                    None,
                )
            }
        };

        self.connected = true;
        tracing::info!(session_id = %self.id, version = %version, "STOMP session connected");

        SessionReply::frame(
            Frame::new(Command::Connected)
                .header("version", version)
                .header("heart-beat", "0,0")
                .header("server", concat!("push-patterns-service/", env!("CARGO_PKG_VERSION")))
                .header("session", self.id.to_string()),
        )
    }

    fn handle_subscribe(&mut self, frame: &Frame, receipt: Option<&str>) -> SessionReply {
        let (Some(id), Some(destination)) = (frame.get("id"), frame.get("destination")) else {
            return SessionReply::error(
                "Invalid SUBSCRIBE",
                "SUBSCRIBE requires id and destination headers",
                receipt,
            );
        };

        if !self.dispatcher.is_broker_destination(destination) {
            tracing::warn!(session_id = %self.id, destination = %destination, "Invalid subscription destination");
            return SessionReply::error(
                "Invalid destination",
                format!("cannot subscribe to {}", destination),
                receipt,
            );
        }

        if self.subscriptions.contains_key(id) {
            return SessionReply::error(
                "Duplicate subscription",
                format!("subscription id {} is already in use", id),
                receipt,
            );
        }

        let sink = Arc::new(SubscriptionSink {
            subscription: id.to_string(),
            destination: destination.to_string(),
            session_id: self.id,
            message_ids: self.message_ids.clone(),
            outbound: self.outbound.clone(),
        });
        let handle = self.dispatcher.registry().subscribe(destination, sink);
        self.subscriptions.insert(id.to_string(), handle);

        tracing::info!(
            session_id = %self.id,
            subscription = %id,
            destination = %destination,
            "Subscribed"
        );
        SessionReply::none().with_receipt(receipt)
    }

    fn handle_unsubscribe(&mut self, frame: &Frame, receipt: Option<&str>) -> SessionReply {
        let Some(id) = frame.get("id") else {
            return SessionReply::error("Invalid UNSUBSCRIBE", "UNSUBSCRIBE requires an id header", receipt);
        };

        match self.subscriptions.remove(id) {
            Some(handle) => {
                self.dispatcher.registry().unsubscribe(&handle);
                tracing::info!(session_id = %self.id, subscription = %id, "Unsubscribed");
            }
            None => {
                tracing::debug!(session_id = %self.id, subscription = %id, "UNSUBSCRIBE for unknown id");
            }
        }
        SessionReply::none().with_receipt(receipt)
    }

    fn handle_send(&mut self, destination: Option<&str>, body: &str, receipt: Option<&str>) -> SessionReply {
        let Some(destination) = destination else {
            return SessionReply::error("Invalid SEND", "SEND requires a destination header", receipt);
        };

        match self.dispatcher.handle_inbound(destination, body) {
            Ok(_) => SessionReply::none().with_receipt(receipt),
            Err(DispatchError::MalformedInput(e)) => {
                tracing::warn!(session_id = %self.id, error = %e, "Rejected inbound message");
                SessionReply::error("Malformed input", e.to_string(), receipt)
            }
            Err(DispatchError::UnknownDestination(destination)) => SessionReply::error(
                "Unknown destination",
                format!("no handler for destination {}", destination),
                receipt,
            ),
        }
    }

    /// Drop subscriptions the registry pruned after a failed delivery, so
    /// their ids can be reused
    fn forget_pruned(&mut self) {
        let registry = self.dispatcher.registry();
        let session_id = self.id;
        self.subscriptions.retain(|id, handle| {
            let live = registry.is_subscribed(handle);
            if !live {
                tracing::warn!(
                    session_id = %session_id,
                    subscription = %id,
                    destination = %handle.topic,
                    "Subscription pruned after failed delivery"
                );
            }
            live
        });
    }

    /// Release every subscription held by this session
    pub fn close(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        let count = self.subscriptions.len();
        for (_, handle) in self.subscriptions.drain() {
            self.dispatcher.registry().unsubscribe(&handle);
        }
        tracing::debug!(session_id = %self.id, released = count, "Released session subscriptions");
    }
}

impl Drop for StompSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Highest version both sides speak. A client without `accept-version` speaks 1.0.
fn negotiate_version(accept: Option<&str>) -> Option<&'static str> {
    let Some(accept) = accept else {
        return Some("1.0");
    };
    let offered: Vec<&str> = accept.split(',').map(str::trim).collect();
    SUPPORTED_VERSIONS
        .iter()
        .find(|v| offered.contains(v))
        .copied()
}
