// Core
pub mod counter;
pub mod event;
pub mod queue;
pub mod registry;
pub mod ticker;

// Delivery modes
pub mod delivery;

// Application layer
pub mod api;
pub mod server;
pub mod sse;
pub mod websocket;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod telemetry;
