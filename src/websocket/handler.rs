use std::fmt::Display;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::server::AppState;
use crate::shutdown::shutdown_requested;

use super::frame::Frame;
use super::session::{SessionControl, SessionReply, StompSession};

/// Subprotocols offered to STOMP clients, best first
const STOMP_PROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];

/// How long the writer gets to flush after the session ends
const SEND_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler for STOMP clients
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_frame_bytes = state.settings.pubsub.max_frame_bytes;
    tracing::debug!("WebSocket upgrade requested");

    ws.protocols(STOMP_PROTOCOLS)
        .max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

#[tracing::instrument(name = "ws.connection", skip(socket, state), fields(otel.kind = "server"))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, ws_receiver) = socket.split();
    serve_session(ws_sender, ws_receiver, state).await;
}

/// Drive one STOMP session until the client leaves or the server shuts down.
///
/// `ws_sender` is closed once every queued frame has been written, or
/// aborted after `SEND_DRAIN_TIMEOUT` if the peer stops reading.
async fn serve_session<W, R, E>(mut ws_sender: W, mut ws_receiver: R, state: AppState)
where
    W: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let guard = state.dispatcher.open_session();
    let (tx, mut rx) = mpsc::channel::<Frame>(state.settings.pubsub.sink_buffer);
    let mut session = StompSession::new(state.dispatcher.clone(), tx.clone());
    let session_id = session.id();

    tracing::info!(session_id = %session_id, "WebSocket connection established");

    // Frames from replies and from topic broadcasts share one writer
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.encode().into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut shutdown = state.shutdown.subscribe();

    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                tracing::debug!(session_id = %session_id, "Closing session for server shutdown");
                break;
            }
            msg = ws_receiver.next() => msg,
        };

        let reply = match msg {
            Some(Ok(msg)) => match process_message(msg, &mut session) {
                Some(reply) => reply,
                None => break,
            },
            Some(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
            None => break,
        };

        let close = reply.control == SessionControl::Close;
        for frame in reply.frames {
            if tx.send(frame).await.is_err() {
                break;
            }
        }
        if close {
            break;
        }
    }

    // Dropping the session releases its subscriptions and their sender clones
    drop(session);
    drop(tx);

    if tokio::time::timeout(SEND_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
        tracing::warn!(session_id = %session_id, "Writer did not finish in time, aborting");
        send_task.abort();
    }

    tracing::info!(
        session_id = %session_id,
        duration_secs = guard.lifetime().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Handle one WebSocket message.
/// Returns `None` when the connection should be closed.
fn process_message(msg: Message, session: &mut StompSession) -> Option<SessionReply> {
    match msg {
        Message::Text(text) => Some(session.handle_text(text.as_str())),
        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => Some(session.handle_text(text)),
            Err(_) => {
                tracing::warn!(session_id = %session.id(), "Binary frame is not valid UTF-8");
                Some(SessionReply {
                    frames: vec![Frame::error("Malformed frame", "frames must be UTF-8 text")],
                    control: SessionControl::Close,
                })
            }
        },
        // Pong replies are sent by axum
        Message::Ping(_) | Message::Pong(_) => Some(SessionReply {
            frames: Vec::new(),
            control: SessionControl::Continue,
        }),
        Message::Close(_) => {
            tracing::debug!(session_id = %session.id(), "Received close frame");
            None
        }
    }
}
