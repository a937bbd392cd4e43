//! Short polling endpoint.

use axum::extract::State;

use crate::server::AppState;

/// GET /api/polling/data - next counter value as `Value: <n>`
pub async fn polling_data(State(state): State<AppState>) -> String {
    state.dispatcher.short_poll()
}
