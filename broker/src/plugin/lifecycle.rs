//! Plugin Lifecycle Management
//!
//! This module defines the per-plugin runtime record and its states.
//!
//! # Lifecycle State Machine
//!
//! ```text
//!     +---------+   ensure_running   +----------+
//!     | Stopped | -----------------> | Starting |
//!     +----+----+                    +----+-----+
//!          ^                              |
//!          |                     +--------+--------+
//!          |                     |                 |
//!          |                     v                 v
//!          |                +---------+       +-------+
//!          |                | Running | ----> | Error |  (probe failed,
//!          |                +----+----+       +---+---+   exit, bad health)
//!          |                     |                |
//!          |                     v                |
//!          |                +----------+          |
//!          +--------------- | Stopping | <--------+  stop()
//!                           +----------+
//! ```
//!
//! `Error` is re-enterable: the next `ensure_running` tries a fresh start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::client::PluginClient;
use super::metadata::PluginMetadata;
use super::process::PluginProcess;

/// Plugin lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// No process
    #[default]
    Stopped,

    /// Process spawned, waiting for the first healthy probe
    Starting,

    /// Process alive and answering RPCs
    Running,

    /// Shutdown in progress
    Stopping,

    /// Last start or health check failed
    Error,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginState::Stopped => write!(f, "stopped"),
            PluginState::Starting => write!(f, "starting"),
            PluginState::Running => write!(f, "running"),
            PluginState::Stopping => write!(f, "stopping"),
            PluginState::Error => write!(f, "error"),
        }
    }
}

impl PluginState {
    /// Whether the plugin can accept RPCs
    pub fn is_running(&self) -> bool {
        matches!(self, PluginState::Running)
    }

    /// Whether a new start attempt may begin from this state
    pub fn can_start(&self) -> bool {
        matches!(self, PluginState::Stopped | PluginState::Error)
    }

    /// Whether a process may exist in this state
    pub fn has_process(&self) -> bool {
        matches!(
            self,
            PluginState::Starting | PluginState::Running | PluginState::Stopping
        )
    }
}

/// Account configuration last pushed to a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginConfiguration {
    pub protocol: String,
    pub account_id: String,
    pub display_name: String,
    pub credentials: HashMap<String, String>,
    pub settings: HashMap<String, String>,
    /// RFC 3339 time of the acknowledged initialization
    pub initialized_at: String,
}

/// Runtime record for one discovered plugin
///
/// Owned exclusively by the supervisor. Invariants:
/// - `Running` implies `process` and `client` are present
/// - `Stopped` implies `process` and `client` are absent
/// - `last_error` is set whenever the state becomes `Error`
pub struct PluginInstance {
    pub metadata: PluginMetadata,
    pub plugin_dir: PathBuf,
    pub process: Option<PluginProcess>,
    pub client: Option<Arc<dyn PluginClient>>,
    pub state: PluginState,
    pub last_error: Option<String>,
    pub configuration: Option<PluginConfiguration>,
    /// Bumped on every start attempt; a launch only commits while it owns
    /// the current generation
    pub start_generation: u64,
}

impl PluginInstance {
    pub fn new(metadata: PluginMetadata, plugin_dir: impl AsRef<Path>) -> Self {
        Self {
            metadata,
            plugin_dir: plugin_dir.as_ref().to_path_buf(),
            process: None,
            client: None,
            state: PluginState::Stopped,
            last_error: None,
            configuration: None,
            start_generation: 0,
        }
    }

    pub fn protocol(&self) -> &str {
        &self.metadata.protocol
    }

    /// Directory the plugin process runs in
    pub fn working_dir(&self) -> PathBuf {
        self.plugin_dir
            .join(&self.metadata.executable.working_directory)
    }

    /// Claim a start attempt: move to `Starting` and return its generation
    ///
    /// Returns `None` unless the current state allows a start.
    pub fn begin_start(&mut self) -> Option<u64> {
        if !self.state.can_start() {
            return None;
        }
        self.state = PluginState::Starting;
        self.start_generation += 1;
        Some(self.start_generation)
    }

    /// Whether the start attempt `generation` still owns this instance
    pub fn owns_start(&self, generation: u64) -> bool {
        self.state == PluginState::Starting && self.start_generation == generation
    }

    /// Record a failure and move to `Error`
    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = PluginState::Error;
        self.last_error = Some(message.into());
    }

    /// Drop process and client handles and move to `Stopped`
    pub fn reset(&mut self) {
        self.process = None;
        self.client = None;
        self.state = PluginState::Stopped;
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("protocol", &self.metadata.protocol)
            .field("plugin_dir", &self.plugin_dir)
            .field("pid", &self.process.as_ref().and_then(|p| p.pid()))
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> PluginMetadata {
        PluginMetadata::parse(
            r#"
name: "Test"
protocol: "test"
executable:
  type: "binary"
  command: ["./run"]
  working_directory: "bin"
grpc:
  port: 50052
capabilities:
  video_codecs: []
  audio_codecs: []
  supported_resolutions: []
  webrtc_support: false
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PluginState::Stopped.to_string(), "stopped");
        assert_eq!(PluginState::Starting.to_string(), "starting");
        assert_eq!(PluginState::Running.to_string(), "running");
        assert_eq!(PluginState::Stopping.to_string(), "stopping");
        assert_eq!(PluginState::Error.to_string(), "error");
    }

    #[test]
    fn test_state_predicates() {
        assert!(PluginState::Stopped.can_start());
        assert!(PluginState::Error.can_start());
        assert!(!PluginState::Starting.can_start());
        assert!(!PluginState::Running.can_start());

        assert!(PluginState::Running.is_running());
        assert!(!PluginState::Starting.is_running());

        assert!(PluginState::Stopping.has_process());
        assert!(!PluginState::Error.has_process());
    }

    #[test]
    fn test_new_instance_is_stopped() {
        let instance = PluginInstance::new(metadata(), "/opt/plugins/test");

        assert_eq!(instance.state, PluginState::Stopped);
        assert!(instance.process.is_none());
        assert!(instance.client.is_none());
        assert!(instance.last_error.is_none());
        assert_eq!(instance.protocol(), "test");
        assert_eq!(
            instance.working_dir(),
            PathBuf::from("/opt/plugins/test/bin")
        );
    }

    #[test]
    fn test_begin_start_claims_once() {
        let mut instance = PluginInstance::new(metadata(), "/tmp");

        let generation = instance.begin_start().unwrap();
        assert_eq!(instance.state, PluginState::Starting);
        assert!(instance.owns_start(generation));
        assert!(instance.begin_start().is_none());

        instance.fail("probe failed");
        let next = instance.begin_start().unwrap();
        assert!(next > generation);
        assert!(!instance.owns_start(generation));
    }

    #[test]
    fn test_fail_and_reset() {
        let mut instance = PluginInstance::new(metadata(), "/tmp");

        instance.fail("boom");
        assert_eq!(instance.state, PluginState::Error);
        assert_eq!(instance.last_error.as_deref(), Some("boom"));

        instance.reset();
        assert_eq!(instance.state, PluginState::Stopped);
        // last error survives a reset for diagnostics
        assert_eq!(instance.last_error.as_deref(), Some("boom"));
    }
}
