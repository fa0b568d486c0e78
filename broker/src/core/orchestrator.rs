//! Call Orchestrator
//!
//! Validates a call request against the known stations, drives the station
//! through `calling`, picks the protocol from the contact address and hands
//! the call to the plugin layer. Any failure after the station entered
//! `calling` rolls it back to `idle`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info, warn};

use call_assist_plugin_api::{
    CallEndRequest, CallEndResponse, CallStartRequest, CallStartResponse, MediaCapabilities,
    Resolution,
};

use super::entities::{CallState, CallStation};
use super::store::{EntityStore, StationUnavailable};
use crate::plugin::PluginProxy;

/// Camera attribute holding the source media URL
pub const STREAM_SOURCE_ATTRIBUTE: &str = "stream_source";

/// Downstream call transport
#[async_trait]
pub trait CallDispatcher: Send + Sync {
    async fn start_call(&self, protocol: &str, request: CallStartRequest)
    -> Option<CallStartResponse>;

    async fn end_call(&self, protocol: &str, request: CallEndRequest) -> Option<CallEndResponse>;
}

#[async_trait]
impl CallDispatcher for PluginProxy {
    async fn start_call(
        &self,
        protocol: &str,
        request: CallStartRequest,
    ) -> Option<CallStartResponse> {
        PluginProxy::start_call(self, protocol, request).await
    }

    async fn end_call(&self, protocol: &str, request: CallEndRequest) -> Option<CallEndResponse> {
        PluginProxy::end_call(self, protocol, request).await
    }
}

/// Structured result of a call operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallOutcome {
    pub success: bool,
    pub message: String,
    /// Empty on failure
    pub call_id: String,
}

impl CallOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            call_id: String::new(),
        }
    }
}

/// A call handed to a plugin and not yet ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveCall {
    pub call_id: String,
    pub station_id: String,
    pub protocol: String,
    pub contact: String,
}

/// Protocol implied by a contact address
///
/// `@user:server` is Matrix, `user@domain.tld` is XMPP.
pub fn detect_protocol(contact: &str) -> Option<&'static str> {
    if contact.starts_with('@') && contact.contains(':') {
        return Some("matrix");
    }
    if contact.contains('@') && contact.contains('.') {
        return Some("xmpp");
    }
    None
}

/// `call_<YYYYMMDD>_<HHMMSS>_<station_id>`
pub fn generate_call_id(station_id: &str, now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default();
    format!("call_{stamp}_{station_id}")
}

pub fn default_camera_capabilities() -> MediaCapabilities {
    MediaCapabilities {
        video_codecs: vec!["H264".to_string(), "VP8".to_string()],
        audio_codecs: vec!["OPUS".to_string(), "PCMU".to_string()],
        supported_resolutions: vec![Resolution::new(640, 480, 10), Resolution::new(1280, 720, 30)],
        hardware_acceleration: false,
        webrtc_support: true,
        max_bandwidth_kbps: 2000,
    }
}

pub fn default_player_capabilities() -> MediaCapabilities {
    MediaCapabilities {
        video_codecs: vec!["H264".to_string(), "VP8".to_string(), "VP9".to_string()],
        audio_codecs: vec!["OPUS".to_string(), "AAC".to_string()],
        supported_resolutions: vec![
            Resolution::new(1920, 1080, 30),
            Resolution::new(1280, 720, 30),
        ],
        hardware_acceleration: true,
        webrtc_support: true,
        max_bandwidth_kbps: 10000,
    }
}

/// Drives call start and end across the store and the plugin layer
pub struct CallOrchestrator {
    store: Arc<EntityStore>,
    dispatcher: Arc<dyn CallDispatcher>,
    active_calls: Mutex<HashMap<String, ActiveCall>>,
}

impl CallOrchestrator {
    pub fn new(store: Arc<EntityStore>, dispatcher: Arc<dyn CallDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            active_calls: Mutex::new(HashMap::new()),
        }
    }

    /// Start a call from `station_id` to `contact`
    pub async fn start_call(&self, station_id: &str, contact: &str) -> CallOutcome {
        info!(station_id = %station_id, contact = %contact, "Starting call");

        let station = match self.store.begin_call(station_id) {
            Ok(station) => station,
            Err(StationUnavailable::NotFound) => {
                return CallOutcome::failure(format!("Call station '{station_id}' not found"));
            }
            Err(StationUnavailable::Unavailable) => {
                return CallOutcome::failure(format!(
                    "Call station '{station_id}' is not available"
                ));
            }
            Err(StationUnavailable::Busy) => {
                return CallOutcome::failure(format!(
                    "Call station '{station_id}' is already in a call"
                ));
            }
        };

        let call_id = generate_call_id(station_id, OffsetDateTime::now_utc());

        match self.dispatch(&call_id, &station, contact).await {
            Ok(protocol) => {
                self.active_calls.lock().insert(
                    call_id.clone(),
                    ActiveCall {
                        call_id: call_id.clone(),
                        station_id: station_id.to_string(),
                        protocol,
                        contact: contact.to_string(),
                    },
                );
                info!(call_id = %call_id, "Call started");
                CallOutcome {
                    success: true,
                    message: format!("Call started successfully to {contact}"),
                    call_id,
                }
            }
            Err(reason) => {
                error!(call_id = %call_id, station_id = %station_id, reason = %reason, "Call failed");
                self.reset_station(station_id);
                CallOutcome::failure("Failed to initiate call through protocol plugins")
            }
        }
    }

    /// Build the call request and forward it; returns the protocol used
    async fn dispatch(
        &self,
        call_id: &str,
        station: &CallStation,
        contact: &str,
    ) -> Result<String, String> {
        let protocol = detect_protocol(contact)
            .ok_or_else(|| format!("Could not determine protocol for contact: {contact}"))?;

        let camera = self
            .store
            .entity(&station.camera_entity_id)
            .ok_or_else(|| format!("Camera entity {} not found", station.camera_entity_id))?;
        let stream_url = camera
            .attributes
            .get(STREAM_SOURCE_ATTRIBUTE)
            .filter(|url| !url.is_empty())
            .cloned()
            .ok_or_else(|| {
                format!(
                    "No stream source found for camera {}",
                    station.camera_entity_id
                )
            })?;

        let request = CallStartRequest {
            call_id: call_id.to_string(),
            target_address: contact.to_string(),
            camera_stream_url: stream_url,
            camera_capabilities: Some(default_camera_capabilities()),
            player_capabilities: Some(default_player_capabilities()),
        };

        match self.dispatcher.start_call(protocol, request).await {
            Some(response) if response.success => {
                info!(call_id = %call_id, protocol = %protocol, message = %response.message, "Plugin accepted call");
                Ok(protocol.to_string())
            }
            Some(response) => Err(format!("Plugin call failed: {}", response.message)),
            None => Err("No response from plugin".to_string()),
        }
    }

    /// End an active call and return its station to `idle`
    pub async fn end_call(&self, call_id: &str) -> CallOutcome {
        let Some(call) = self.active_calls.lock().remove(call_id) else {
            return CallOutcome::failure(format!("Call '{call_id}' not found"));
        };

        let request = CallEndRequest {
            call_id: call_id.to_string(),
            reason: "user_requested".to_string(),
        };
        let response = self.dispatcher.end_call(&call.protocol, request).await;
        self.reset_station(&call.station_id);

        match response {
            Some(response) if response.success => {
                info!(call_id = %call_id, "Call ended");
                CallOutcome {
                    success: true,
                    message: format!("Call '{call_id}' ended"),
                    call_id: call_id.to_string(),
                }
            }
            Some(response) => {
                warn!(call_id = %call_id, message = %response.message, "Plugin failed to end call");
                CallOutcome {
                    success: false,
                    message: format!("Plugin failed to end call: {}", response.message),
                    call_id: call_id.to_string(),
                }
            }
            None => {
                warn!(call_id = %call_id, "No response from plugin while ending call");
                CallOutcome {
                    success: false,
                    message: "No response from plugin".to_string(),
                    call_id: call_id.to_string(),
                }
            }
        }
    }

    /// Calls started and not yet ended
    pub fn active_calls(&self) -> Vec<ActiveCall> {
        let mut calls: Vec<ActiveCall> = self.active_calls.lock().values().cloned().collect();
        calls.sort_by(|a, b| a.call_id.cmp(&b.call_id));
        calls
    }

    fn reset_station(&self, station_id: &str) {
        // The station may have vanished from configuration meanwhile
        if let Err(e) = self.store.set_station_state(station_id, CallState::Idle) {
            warn!(station_id = %station_id, error = %e, "Could not reset station");
        }
    }
}
