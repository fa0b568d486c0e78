use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, calls, entities, plugins};
use crate::state::AppState;
use std::sync::Arc;

/// Create the broker API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        // Plugins
        .route("/plugins", get(plugins::list_plugins))
        .route("/plugins/{protocol}", get(plugins::get_plugin))
        .route(
            "/plugins/{protocol}/accounts",
            post(plugins::initialize_account),
        )
        // Entities and stations
        .route("/entities", post(entities::ingest_entity))
        .route("/entities/stream", get(entities::stream_entities))
        .route("/stations", get(entities::list_stations))
        // Calls
        .route("/calls", get(calls::list_calls).post(calls::start_call))
        .route("/calls/{call_id}/end", post(calls::end_call))
        .layer(TraceLayer::new_for_http())
}
