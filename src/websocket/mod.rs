//! Pub/Sub over STOMP on a WebSocket.

mod frame;
mod handler;
mod session;

pub use frame::{Command, Frame, FrameError};
pub use handler::ws_handler;
pub use session::{SessionControl, SessionReply, StompSession};
