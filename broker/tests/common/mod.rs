//! Shared fixtures for broker integration tests
//!
//! `ScriptedConnector` stands in for the gRPC transport. Every client it
//! hands out answers from the same `ScriptedPlugin`, whose replies can be
//! flipped at runtime and whose RPCs are counted.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use call_assist_broker::core::{HaEntity, StationConfig};
use call_assist_broker::plugin::{
    PluginClient, PluginConnector, PluginInstance, PluginMetadata,
};
use call_assist_broker::{PluginResult, SupervisorConfig};
use call_assist_plugin_api::{
    CallEndRequest, CallEndResponse, CallStartRequest, CallStartResponse, CallState,
    HealthResponse, PluginConfig, PluginStatus,
};

/// Replies and counters shared by every scripted client
pub struct ScriptedPlugin {
    pub healthy: AtomicBool,
    pub accept_initialize: AtomicBool,
    pub accept_calls: AtomicBool,
    pub health_calls: AtomicUsize,
    pub initialize_calls: AtomicUsize,
    pub start_call_calls: AtomicUsize,
    pub end_call_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
    pub last_config: Mutex<Option<PluginConfig>>,
    pub last_start: Mutex<Option<CallStartRequest>>,
}

impl Default for ScriptedPlugin {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            accept_initialize: AtomicBool::new(true),
            accept_calls: AtomicBool::new(true),
            health_calls: AtomicUsize::new(0),
            initialize_calls: AtomicUsize::new(0),
            start_call_calls: AtomicUsize::new(0),
            end_call_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            last_config: Mutex::new(None),
            last_start: Mutex::new(None),
        }
    }
}

impl ScriptedPlugin {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct ScriptedClient {
    plugin: Arc<ScriptedPlugin>,
}

#[async_trait]
impl PluginClient for ScriptedClient {
    async fn health(&self) -> PluginResult<HealthResponse> {
        self.plugin.health_calls.fetch_add(1, Ordering::SeqCst);
        let healthy = self.plugin.healthy.load(Ordering::SeqCst);
        Ok(HealthResponse {
            healthy,
            message: if healthy { "ok" } else { "degraded" }.to_string(),
        })
    }

    async fn initialize(&self, config: PluginConfig) -> PluginResult<PluginStatus> {
        self.plugin.initialize_calls.fetch_add(1, Ordering::SeqCst);
        *self.plugin.last_config.lock() = Some(config);
        let initialized = self.plugin.accept_initialize.load(Ordering::SeqCst);
        Ok(PluginStatus {
            initialized,
            message: if initialized { "ready" } else { "rejected" }.to_string(),
            capabilities: None,
        })
    }

    async fn start_call(&self, request: CallStartRequest) -> PluginResult<CallStartResponse> {
        self.plugin.start_call_calls.fetch_add(1, Ordering::SeqCst);
        *self.plugin.last_start.lock() = Some(request);
        let success = self.plugin.accept_calls.load(Ordering::SeqCst);
        Ok(CallStartResponse {
            success,
            message: if success { "ringing" } else { "busy" }.to_string(),
            state: if success {
                CallState::Ringing as i32
            } else {
                CallState::Failed as i32
            },
            remote_stream_url: None,
        })
    }

    async fn end_call(&self, _request: CallEndRequest) -> PluginResult<CallEndResponse> {
        self.plugin.end_call_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CallEndResponse {
            success: true,
            message: "ended".to_string(),
        })
    }

    async fn shutdown(&self) -> PluginResult<()> {
        self.plugin.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that records the ports it was asked to reach
#[derive(Default)]
pub struct ScriptedConnector {
    pub plugin: Arc<ScriptedPlugin>,
    pub ports: Mutex<Vec<u16>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ports(&self) -> Vec<u16> {
        self.ports.lock().clone()
    }
}

impl PluginConnector for ScriptedConnector {
    fn connect(&self, port: u16) -> PluginResult<Arc<dyn PluginClient>> {
        self.ports.lock().push(port);
        Ok(Arc::new(ScriptedClient {
            plugin: self.plugin.clone(),
        }))
    }
}

/// Supervisor policy with every wait shrunk to milliseconds
pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        spawn_settle: Duration::from_millis(50),
        health_probe_interval: Duration::from_millis(20),
        health_probe_timeout: Duration::from_millis(200),
        health_check_timeout: Duration::from_millis(200),
        rpc_timeout: Duration::from_millis(500),
        shutdown_rpc_timeout: Duration::from_millis(200),
        terminate_grace: Duration::from_millis(500),
        kill_wait: Duration::from_millis(500),
        shutdown_all_timeout: Duration::from_secs(3),
        startup_poll_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// Plugin instance running `command`, requiring `credentials`
pub fn plugin(protocol: &str, command: &[&str], credentials: &[&str]) -> PluginInstance {
    let descriptor = format!(
        r#"
name: "{protocol} test plugin"
protocol: "{protocol}"
version: "0.1.0"
executable:
  type: "binary"
  command: {command}
grpc:
  port: 50051
  health_check_timeout: 1
  startup_timeout: 2
capabilities:
  video_codecs: ["VP8", "H264"]
  audio_codecs: ["OPUS"]
  supported_resolutions:
    - {{ width: 1280, height: 720, framerate: 30 }}
  webrtc_support: true
required_credentials: {credentials}
"#,
        command = serde_json::to_string(command).unwrap(),
        credentials = serde_json::to_string(credentials).unwrap(),
    );
    let metadata = PluginMetadata::parse(&descriptor).unwrap();
    PluginInstance::new(metadata, std::env::temp_dir())
}

/// Plugin backed by a long-lived `sleep` process
pub fn sleeper(protocol: &str, credentials: &[&str]) -> PluginInstance {
    plugin(protocol, &["sleep", "30"], credentials)
}

pub fn station(id: &str, camera: &str, player: &str) -> StationConfig {
    StationConfig {
        station_id: id.to_string(),
        display_name: format!("{id} station"),
        camera_entity_id: camera.to_string(),
        media_player_entity_id: player.to_string(),
        enabled: true,
    }
}

pub fn entity(entity_id: &str, available: bool) -> HaEntity {
    let domain = entity_id.split('.').next().unwrap_or_default().to_string();
    HaEntity {
        entity_id: entity_id.to_string(),
        domain,
        name: entity_id.to_string(),
        state: if available { "idle" } else { "unavailable" }.to_string(),
        attributes: HashMap::new(),
        available,
        last_updated: String::new(),
    }
}

pub fn camera_with_stream(entity_id: &str, url: &str) -> HaEntity {
    let mut camera = entity(entity_id, true);
    camera
        .attributes
        .insert("stream_source".to_string(), url.to_string());
    camera
}
