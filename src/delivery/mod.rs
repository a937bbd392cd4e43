//! Delivery dispatcher: the four push modes over one core.
//!
//! - Short polling: `Value: <n>` from the shared counter
//! - Long polling: wait on the event queue, deliver or time out
//! - SSE: a tick stream per client, closed on disconnect or shutdown
//! - Pub/Sub: inbound messages routed and broadcast through the registry

mod dispatcher;
mod stream;
mod types;

pub use dispatcher::{DispatcherConfig, PushDispatcher, SessionGuard};
pub use stream::TickEventStream;
pub use types::{
    DispatchError, DispatcherStats, DispatcherStatsSnapshot, LongPollOutcome, LongPollState,
    StreamState,
};
