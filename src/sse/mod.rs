//! Server-Sent Events tick stream.
//!
//! # Endpoint
//!
//! `GET /sse`
//!
//! Each connected client gets its own ticker. Events carry the rendered tick
//! as their data field:
//!
//! ```text
//! data: Tick: 0
//!
//! data: Tick: 1
//! ```
//!
//! The stream closes when the client disconnects or the server shuts down.

mod handler;

pub use handler::sse_handler;
