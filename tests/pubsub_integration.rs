//! Pub/Sub integration tests
//!
//! Several STOMP sessions share one dispatcher, the same way WebSocket
//! connections share it in the running server. Frames are written as raw
//! text and outbound frames are read from each session's channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use push_patterns_service::config::Settings;
use push_patterns_service::delivery::PushDispatcher;
use push_patterns_service::server::AppState;
use push_patterns_service::websocket::{Command, Frame, SessionControl, StompSession};

struct TestClient {
    session: StompSession,
    outbound: mpsc::Receiver<Frame>,
}

impl TestClient {
    fn connect(dispatcher: &Arc<PushDispatcher>) -> Self {
        let (tx, outbound) = mpsc::channel(16);
        let mut session = StompSession::new(dispatcher.clone(), tx);
        let reply = session.handle_text("CONNECT\naccept-version:1.2\nhost:localhost\n\n\0");
        assert_eq!(reply.frames[0].command, Command::Connected);
        Self { session, outbound }
    }

    fn send_raw(&mut self, text: &str) -> Vec<Frame> {
        let reply = self.session.handle_text(text);
        assert_eq!(reply.control, SessionControl::Continue, "unexpected close: {:?}", reply.frames);
        reply.frames
    }

    fn subscribe(&mut self, id: &str, destination: &str) {
        self.send_raw(&format!("SUBSCRIBE\nid:{}\ndestination:{}\n\n\0", id, destination));
    }

    fn send(&mut self, destination: &str, body: &str) {
        self.send_raw(&format!("SEND\ndestination:{}\n\n{}\0", destination, body));
    }

    fn received(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

fn create_test_dispatcher() -> Arc<PushDispatcher> {
    AppState::new(Settings::default()).dispatcher
}

// =============================================================================
// Greeting Tests
// =============================================================================

mod greeting_tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_gets_one_greeting() {
        let dispatcher = create_test_dispatcher();
        let mut alice = TestClient::connect(&dispatcher);
        let mut bob = TestClient::connect(&dispatcher);
        let mut sender = TestClient::connect(&dispatcher);

        alice.subscribe("sub-0", "/topic/greetings");
        bob.subscribe("sub-7", "/topic/greetings");

        sender.send("/app/hello", "World");

        for (client, subscription) in [(&mut alice, "sub-0"), (&mut bob, "sub-7")] {
            let frames = client.received();
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].command, Command::Message);
            assert_eq!(frames[0].body, "Hello: World");
            assert_eq!(frames[0].get("subscription"), Some(subscription));
            assert_eq!(frames[0].get("destination"), Some("/topic/greetings"));
        }
        assert!(sender.received().is_empty());
    }

    #[tokio::test]
    async fn test_message_frames_encode_for_the_wire() {
        let dispatcher = create_test_dispatcher();
        let mut subscriber = TestClient::connect(&dispatcher);
        let mut sender = TestClient::connect(&dispatcher);

        subscriber.subscribe("0", "/topic/greetings");
        sender.send("/app/hello", "World");

        let frame = subscriber.received().remove(0);
        let wire = frame.encode();
        assert!(wire.starts_with("MESSAGE\n"));
        assert!(wire.contains("content-length:12\n"));
        assert!(wire.ends_with("\n\nHello: World\0"));

        let reparsed = Frame::parse(&wire).unwrap().unwrap();
        assert_eq!(reparsed.body, "Hello: World");
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers_is_dropped() {
        let dispatcher = create_test_dispatcher();
        let mut sender = TestClient::connect(&dispatcher);

        sender.send("/app/hello", "nobody home");

        let stats = dispatcher.stats();
        assert_eq!(stats.broadcasts, 1);
        assert_eq!(stats.deliveries, 0);
    }
}

// =============================================================================
// Topic Tests
// =============================================================================

mod topic_tests {
    use super::*;

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let dispatcher = create_test_dispatcher();
        let mut news = TestClient::connect(&dispatcher);
        let mut sports = TestClient::connect(&dispatcher);
        let mut sender = TestClient::connect(&dispatcher);

        news.subscribe("0", "/topic/news");
        sports.subscribe("0", "/topic/sports");

        sender.send("/topic/news", "headline");

        let frames = news.received();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, "headline");
        assert!(sports.received().is_empty());
    }

    #[tokio::test]
    async fn test_messages_arrive_in_publish_order() {
        let dispatcher = create_test_dispatcher();
        let mut subscriber = TestClient::connect(&dispatcher);
        let mut sender = TestClient::connect(&dispatcher);

        subscriber.subscribe("0", "/topic/greetings");
        for name in ["one", "two", "three"] {
            sender.send("/app/hello", name);
        }

        let bodies: Vec<String> = subscriber.received().into_iter().map(|f| f.body).collect();
        assert_eq!(bodies, vec!["Hello: one", "Hello: two", "Hello: three"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let dispatcher = create_test_dispatcher();
        let mut subscriber = TestClient::connect(&dispatcher);
        let mut sender = TestClient::connect(&dispatcher);

        subscriber.subscribe("0", "/topic/greetings");
        sender.send("/app/hello", "before");
        subscriber.send_raw("UNSUBSCRIBE\nid:0\n\n\0");
        sender.send("/app/hello", "after");

        let bodies: Vec<String> = subscriber.received().into_iter().map(|f| f.body).collect();
        assert_eq!(bodies, vec!["Hello: before"]);
        assert_eq!(dispatcher.registry().subscriber_count("/topic/greetings"), 0);
    }

    #[tokio::test]
    async fn test_receipts_confirm_frames() {
        let dispatcher = create_test_dispatcher();
        let mut client = TestClient::connect(&dispatcher);

        let frames = client.send_raw("SUBSCRIBE\nid:0\ndestination:/topic/greetings\nreceipt:sub-receipt\n\n\0");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Receipt);
        assert_eq!(frames[0].get("receipt-id"), Some("sub-receipt"));
    }
}

// =============================================================================
// Session Lifecycle Tests
// =============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnect_releases_subscriptions() {
        let dispatcher = create_test_dispatcher();
        let mut client = TestClient::connect(&dispatcher);
        client.subscribe("0", "/topic/greetings");
        client.subscribe("1", "/topic/news");
        assert_eq!(dispatcher.registry().stats().total_subscriptions, 2);

        let reply = client.session.handle_text("DISCONNECT\nreceipt:bye\n\n\0");
        assert_eq!(reply.control, SessionControl::Close);
        assert_eq!(reply.frames[0].get("receipt-id"), Some("bye"));

        drop(client);
        assert_eq!(dispatcher.registry().stats().total_subscriptions, 0);
        assert!(dispatcher.registry().topics().is_empty());
    }

    #[tokio::test]
    async fn test_error_frame_closes_session() {
        let dispatcher = create_test_dispatcher();
        let mut client = TestClient::connect(&dispatcher);

        let reply = client.session.handle_text("SEND\ndestination:/queue/unknown\n\nx\0");
        assert_eq!(reply.control, SessionControl::Close);
        assert_eq!(reply.frames[0].command, Command::Error);
        assert_eq!(dispatcher.stats().inbound_rejected, 1);
    }

    #[tokio::test]
    async fn test_dead_subscriber_is_pruned_without_affecting_others() {
        let dispatcher = create_test_dispatcher();
        let mut alive = TestClient::connect(&dispatcher);
        let mut dead = TestClient::connect(&dispatcher);
        let mut sender = TestClient::connect(&dispatcher);

        alive.subscribe("0", "/topic/greetings");
        dead.subscribe("0", "/topic/greetings");

        // The connection's writer went away but the session was not closed yet
        let TestClient { session: dead_session, outbound } = dead;
        drop(outbound);

        sender.send("/app/hello", "World");

        assert_eq!(alive.received().len(), 1);
        assert_eq!(dispatcher.registry().subscriber_count("/topic/greetings"), 1);
        assert_eq!(dispatcher.stats().pruned, 1);
        drop(dead_session);
    }
}
