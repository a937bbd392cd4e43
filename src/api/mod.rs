//! API layer - HTTP endpoint handlers organized by delivery mode.

mod health;
mod longpoll;
mod metrics;
mod polling;
mod routes;

pub use health::{health, stats};
pub use longpoll::{longpoll_events, longpoll_publish};
pub use metrics::prometheus_metrics;
pub use polling::polling_data;
pub use routes::api_routes;
