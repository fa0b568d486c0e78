use axum::{Json, extract::State};
use std::sync::Arc;

use crate::core::BrokerHealth;
use crate::state::AppState;

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<BrokerHealth> {
    Json(state.store.health())
}
