//! Plugin REST Endpoints
//!
//! # Endpoints
//!
//! - `GET /plugins` - List every discovered plugin with its state
//! - `GET /plugins/{protocol}` - Plugin metadata, state and account form schema
//! - `POST /plugins/{protocol}/accounts` - Initialize an account on a plugin

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::plugin::{CapabilitiesConfig, PluginMetadata, PluginState, ProtocolSchema};
use crate::state::AppState;

/// Response for GET /plugins
#[derive(Debug, Serialize)]
pub struct PluginListResponse {
    pub plugins: Vec<PluginSummary>,
    pub total_count: usize,
}

/// One row of the plugin list
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub protocol: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub state: PluginState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub capabilities: CapabilitiesConfig,
}

/// Response for GET /plugins/{protocol}
#[derive(Debug, Serialize)]
pub struct PluginDetailResponse {
    pub metadata: PluginMetadata,
    pub state: PluginState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether an account was initialized successfully
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialized_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<ProtocolSchema>,
}

/// Body of POST /plugins/{protocol}/accounts
#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    pub account_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// List all plugins
pub async fn list_plugins(State(state): State<Arc<AppState>>) -> Json<PluginListResponse> {
    let supervisor = &state.supervisor;
    let plugins: Vec<PluginSummary> = supervisor
        .all_metadata()
        .into_iter()
        .map(|metadata| PluginSummary {
            state: supervisor
                .plugin_state(&metadata.protocol)
                .unwrap_or_default(),
            last_error: supervisor.last_error(&metadata.protocol),
            protocol: metadata.protocol,
            name: metadata.name,
            version: metadata.version,
            description: metadata.description,
            capabilities: metadata.capabilities,
        })
        .collect();

    Json(PluginListResponse {
        total_count: plugins.len(),
        plugins,
    })
}

/// Get one plugin
pub async fn get_plugin(
    State(state): State<Arc<AppState>>,
    Path(protocol): Path<String>,
) -> Response {
    let supervisor = &state.supervisor;
    let Some(metadata) = supervisor.plugin_info(&protocol) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Plugin not found: {}", protocol)})),
        )
            .into_response();
    };

    let configuration = supervisor.plugin_configuration(&protocol);
    let detail = PluginDetailResponse {
        state: supervisor.plugin_state(&protocol).unwrap_or_default(),
        last_error: supervisor.last_error(&protocol),
        configured: configuration.is_some(),
        initialized_at: configuration.map(|c| c.initialized_at),
        schema: state.proxy.protocol_schemas().remove(&protocol),
        metadata,
    };

    (StatusCode::OK, Json(detail)).into_response()
}

/// Initialize an account on a plugin, starting the plugin if needed
pub async fn initialize_account(
    State(state): State<Arc<AppState>>,
    Path(protocol): Path<String>,
    Json(request): Json<AccountRequest>,
) -> Response {
    let Some(metadata) = state.supervisor.plugin_info(&protocol) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Plugin not found: {}", protocol)})),
        )
            .into_response();
    };

    let missing = metadata.missing_credentials(request.credentials.keys());
    if !missing.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "Missing required credentials",
                "missing": missing,
            })),
        )
            .into_response();
    }

    let initialized = state
        .proxy
        .initialize_account_with_settings(
            &protocol,
            &request.account_id,
            &request.display_name,
            request.credentials,
            request.settings,
        )
        .await;

    if initialized {
        (
            StatusCode::OK,
            Json(json!({"success": true, "protocol": protocol, "account_id": request.account_id})),
        )
            .into_response()
    } else {
        let error = state
            .supervisor
            .last_error(&protocol)
            .unwrap_or_else(|| "Account initialization failed".to_string());
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({"success": false, "error": error})),
        )
            .into_response()
    }
}
