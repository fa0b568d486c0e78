//! # Call Assist Plugin API
//!
//! This crate defines the RPC contract spoken between the Call Assist broker
//! and its protocol plugins. Every plugin is a separate process that serves
//! the `callassist.plugin.CallPlugin` gRPC service on the port handed to it
//! through the [`PORT_ENV`] environment variable.
//!
//! # Service Definition
//!
//! ```protobuf
//! service CallPlugin {
//!     rpc GetHealth(google.protobuf.Empty) returns (HealthResponse);
//!     rpc Initialize(PluginConfig) returns (PluginStatus);
//!     rpc StartCall(CallStartRequest) returns (CallStartResponse);
//!     rpc EndCall(CallEndRequest) returns (CallEndResponse);
//!     rpc Shutdown(google.protobuf.Empty) returns (google.protobuf.Empty);
//! }
//! ```
//!
//! Messages are plain `prost` structs so the broker can drive the service
//! with `tonic`'s generic client without a build-time code generation step.
//! Plugin authors in any language can regenerate the same wire format from
//! the definitions documented on each type.

use std::collections::HashMap;

// =============================================================================
// Service paths
// =============================================================================

/// Environment variable carrying the port a plugin must listen on.
pub const PORT_ENV: &str = "PORT";

/// Fully-qualified gRPC service name.
pub const SERVICE_NAME: &str = "callassist.plugin.CallPlugin";

/// gRPC method paths for the `CallPlugin` service.
pub mod paths {
    pub const GET_HEALTH: &str = "/callassist.plugin.CallPlugin/GetHealth";
    pub const INITIALIZE: &str = "/callassist.plugin.CallPlugin/Initialize";
    pub const START_CALL: &str = "/callassist.plugin.CallPlugin/StartCall";
    pub const END_CALL: &str = "/callassist.plugin.CallPlugin/EndCall";
    pub const SHUTDOWN: &str = "/callassist.plugin.CallPlugin/Shutdown";
}

// =============================================================================
// Common messages
// =============================================================================

/// `google.protobuf.Empty`
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct Empty {}

/// Video resolution supported by a media endpoint.
///
/// ```protobuf
/// message Resolution {
///     int32 width = 1;
///     int32 height = 2;
///     int32 framerate = 3;
/// }
/// ```
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Resolution {
    #[prost(int32, tag = "1")]
    pub width: i32,
    #[prost(int32, tag = "2")]
    pub height: i32,
    #[prost(int32, tag = "3")]
    pub framerate: i32,
}

impl Resolution {
    pub fn new(width: i32, height: i32, framerate: i32) -> Self {
        Self {
            width,
            height,
            framerate,
        }
    }
}

/// Media capabilities of a source or destination endpoint.
///
/// The broker never negotiates these itself; it forwards them so that the
/// plugin can pick a common codec and resolution.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MediaCapabilities {
    #[prost(string, repeated, tag = "1")]
    pub video_codecs: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub audio_codecs: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub supported_resolutions: Vec<Resolution>,
    #[prost(bool, tag = "4")]
    pub hardware_acceleration: bool,
    #[prost(bool, tag = "5")]
    pub webrtc_support: bool,
    #[prost(int32, tag = "6")]
    pub max_bandwidth_kbps: i32,
}

/// Call state reported by a plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CallState {
    Unknown = 0,
    Initiating = 1,
    Ringing = 2,
    Connecting = 3,
    Active = 4,
    Ended = 5,
    Failed = 6,
}

impl CallState {
    /// Lowercase label used in logs and JSON payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Unknown => "unknown",
            CallState::Initiating => "initiating",
            CallState::Ringing => "ringing",
            CallState::Connecting => "connecting",
            CallState::Active => "active",
            CallState::Ended => "ended",
            CallState::Failed => "failed",
        }
    }
}

// =============================================================================
// Health
// =============================================================================

/// Response of `GetHealth`.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct HealthResponse {
    #[prost(bool, tag = "1")]
    pub healthy: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

// =============================================================================
// Initialization
// =============================================================================

/// Account configuration sent with `Initialize`.
///
/// ```protobuf
/// message PluginConfig {
///     string protocol = 1;
///     string account_id = 2;
///     string display_name = 3;
///     map<string, string> credentials = 4;
///     map<string, string> settings = 5;
/// }
/// ```
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PluginConfig {
    #[prost(string, tag = "1")]
    pub protocol: String,
    #[prost(string, tag = "2")]
    pub account_id: String,
    #[prost(string, tag = "3")]
    pub display_name: String,
    #[prost(map = "string, string", tag = "4")]
    pub credentials: HashMap<String, String>,
    #[prost(map = "string, string", tag = "5")]
    pub settings: HashMap<String, String>,
}

/// Response of `Initialize`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PluginStatus {
    #[prost(bool, tag = "1")]
    pub initialized: bool,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, optional, tag = "3")]
    pub capabilities: Option<MediaCapabilities>,
}

// =============================================================================
// Calls
// =============================================================================

/// Request of `StartCall`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallStartRequest {
    #[prost(string, tag = "1")]
    pub call_id: String,
    #[prost(string, tag = "2")]
    pub target_address: String,
    #[prost(string, tag = "3")]
    pub camera_stream_url: String,
    #[prost(message, optional, tag = "4")]
    pub camera_capabilities: Option<MediaCapabilities>,
    #[prost(message, optional, tag = "5")]
    pub player_capabilities: Option<MediaCapabilities>,
}

/// Response of `StartCall`.
///
/// `remote_stream_url` is the stream handle the player should render, when
/// the plugin already has one at call start.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallStartResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(enumeration = "CallState", tag = "3")]
    pub state: i32,
    #[prost(string, optional, tag = "4")]
    pub remote_stream_url: Option<String>,
}

/// Request of `EndCall`.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct CallEndRequest {
    #[prost(string, tag = "1")]
    pub call_id: String,
    #[prost(string, tag = "2")]
    pub reason: String,
}

/// Response of `EndCall`.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct CallEndResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_paths_share_service_name() {
        for path in [
            paths::GET_HEALTH,
            paths::INITIALIZE,
            paths::START_CALL,
            paths::END_CALL,
            paths::SHUTDOWN,
        ] {
            assert!(path.starts_with(&format!("/{SERVICE_NAME}/")));
        }
    }

    #[test]
    fn test_call_start_response_state() {
        let response = CallStartResponse {
            success: true,
            message: "ringing".to_string(),
            state: CallState::Ringing as i32,
            remote_stream_url: None,
        };
        assert_eq!(response.state(), CallState::Ringing);
        assert_eq!(response.state().as_str(), "ringing");
    }

    #[test]
    fn test_plugin_config_wire_format() {
        let mut credentials = HashMap::new();
        credentials.insert("access_token".to_string(), "secret".to_string());
        let config = PluginConfig {
            protocol: "matrix".to_string(),
            account_id: "@bot:example.org".to_string(),
            display_name: "Bot".to_string(),
            credentials,
            settings: HashMap::new(),
        };

        let bytes = config.encode_to_vec();
        let decoded = PluginConfig::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.credentials.get("access_token").unwrap(), "secret");
        assert!(decoded.settings.is_empty());
    }

    #[test]
    fn test_empty_encodes_to_nothing() {
        assert!(Empty {}.encode_to_vec().is_empty());
    }
}
