//! Configuration module for the Call Assist broker
//!
//! This module handles broker configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use call_assist_broker::config::BrokerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = BrokerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("broker.yaml");
//! let config = BrokerConfig::from_file(&config_path)?;
//!
//! println!("Broker listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Default first port probed for plugin gRPC servers
pub const DEFAULT_PLUGIN_PORT_START: u16 = 50051;

/// Default number of ports probed before giving up
pub const DEFAULT_PLUGIN_PORT_MAX_ATTEMPTS: u16 = 100;

/// Timing and port policy for the plugin supervisor
///
/// Defaults follow the broker's production behavior. Tests shrink the
/// intervals to keep lifecycle scenarios fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// First port probed when launching a plugin
    pub port_range_start: u16,
    /// Number of successive ports probed
    pub port_max_attempts: u16,
    /// Wait between spawn and the "still alive" check
    pub spawn_settle: Duration,
    /// Interval between startup health probes
    pub health_probe_interval: Duration,
    /// Budget for a single startup health probe
    pub health_probe_timeout: Duration,
    /// Budget for the health check of an already-running plugin
    pub health_check_timeout: Duration,
    /// Budget for initialize / start call / end call RPCs
    pub rpc_timeout: Duration,
    /// Budget for the graceful shutdown RPC
    pub shutdown_rpc_timeout: Duration,
    /// Wait after SIGTERM before escalating to SIGKILL
    pub terminate_grace: Duration,
    /// Wait after SIGKILL
    pub kill_wait: Duration,
    /// Overall bound for `shutdown_all`
    pub shutdown_all_timeout: Duration,
    /// Poll interval while another caller is starting the same plugin
    pub startup_poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            port_range_start: DEFAULT_PLUGIN_PORT_START,
            port_max_attempts: DEFAULT_PLUGIN_PORT_MAX_ATTEMPTS,
            spawn_settle: Duration::from_millis(200),
            health_probe_interval: Duration::from_millis(500),
            health_probe_timeout: Duration::from_secs(1),
            health_check_timeout: Duration::from_secs(2),
            rpc_timeout: Duration::from_secs(10),
            shutdown_rpc_timeout: Duration::from_secs(5),
            terminate_grace: Duration::from_secs(2),
            kill_wait: Duration::from_secs(1),
            shutdown_all_timeout: Duration::from_secs(10),
            startup_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Broker configuration
///
/// Contains everything needed to run the broker:
/// - HTTP server settings (host, port)
/// - Plugin discovery root and supervisor policy
/// - Call-station configuration source
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Plugin settings
    /// Directory whose immediate subdirectories each hold one `plugin.yaml`
    pub plugins_root: PathBuf,
    pub supervisor: SupervisorConfig,

    // Call stations
    /// YAML file listing configured call stations (optional)
    /// If None, stations are managed in memory through the API only
    pub stations_file: Option<PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            plugins_root: PathBuf::from("./plugins"),
            supervisor: SupervisorConfig::default(),
            stations_file: None,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables and defaults
    ///
    /// The .env file is loaded in main.rs at application startup, so its
    /// values are already visible as environment variables here.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate_supervisor(&config.supervisor)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - The merged supervisor policy is invalid
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_supervisor(&config.supervisor)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
