//! Entity REST and SSE Endpoints
//!
//! - `POST /entities` - Ingest one device entity update
//! - `GET /stations` - Current call stations
//! - `GET /entities/stream` - Server-sent events: snapshot, then live updates

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde_json::json;
use tracing::{error, warn};

use crate::core::{CallStation, HaEntity};
use crate::state::AppState;

/// Ingest an entity update
pub async fn ingest_entity(
    State(state): State<Arc<AppState>>,
    Json(entity): Json<HaEntity>,
) -> Response {
    if entity.entity_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "entity_id must not be empty"})),
        )
            .into_response();
    }

    let entity_id = entity.entity_id.clone();

    // Ingest may reload the station source from disk
    let store = state.store.clone();
    let stations_changed = match tokio::task::spawn_blocking(move || store.ingest(entity)).await
    {
        Ok(changed) => changed,
        Err(e) => {
            error!(entity_id = %entity_id, error = %e, "Entity ingest task failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to ingest entity"})),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        Json(json!({"entity_id": entity_id, "stations_changed": stations_changed})),
    )
        .into_response()
}

/// List call stations
pub async fn list_stations(State(state): State<Arc<AppState>>) -> Json<Vec<CallStation>> {
    Json(state.store.stations())
}

/// Stream broker entities as server-sent events
///
/// Each event is named `entity` and carries one JSON-encoded
/// `BrokerEntityUpdate`. Disconnecting drops the subscription; broker
/// shutdown ends the stream so graceful shutdown can complete.
pub async fn stream_entities(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.store.subscribe();
    let shutdown = state.shutdown.clone().cancelled_owned();

    let events = subscription.take_until(shutdown).filter_map(|update| async move {
        match Event::default().event("entity").json_data(&update) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!(entity_id = %update.entity_id, error = %e, "Failed to encode entity update");
                None
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
