//! Call REST Endpoints
//!
//! - `POST /calls` - Start a call from a station to a contact
//! - `GET /calls` - Calls currently in progress
//! - `POST /calls/{call_id}/end` - End a call

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::core::ActiveCall;
use crate::state::AppState;

/// Body of POST /calls
#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub call_station_id: String,
    pub contact: String,
}

/// Start a call
pub async fn start_call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartCallRequest>,
) -> Response {
    let known = state.store.station(&request.call_station_id).is_some();
    let outcome = state
        .orchestrator
        .start_call(&request.call_station_id, &request.contact)
        .await;

    let status = if outcome.success {
        StatusCode::OK
    } else if !known {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    (status, Json(outcome)).into_response()
}

/// List active calls
pub async fn list_calls(State(state): State<Arc<AppState>>) -> Json<Vec<ActiveCall>> {
    Json(state.orchestrator.active_calls())
}

/// End a call
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Response {
    let known = state
        .orchestrator
        .active_calls()
        .iter()
        .any(|call| call.call_id == call_id);
    let outcome = state.orchestrator.end_call(&call_id).await;

    let status = if outcome.success {
        StatusCode::OK
    } else if !known {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_GATEWAY
    };

    (status, Json(outcome)).into_response()
}
