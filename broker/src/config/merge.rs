use std::path::PathBuf;
use std::time::Duration;

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{BrokerConfig, SupervisorConfig};

/// Merge environment variables (base) with optional YAML overrides
///
/// Each value resolves as: YAML if present, else environment, else default.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<BrokerConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();
    let defaults = BrokerConfig::default();

    let server = yaml.server.unwrap_or_default();
    let plugins = yaml.plugins.unwrap_or_default();
    let stations = yaml.stations.unwrap_or_default();

    let base = SupervisorConfig::default();
    let millis = |value: Option<u64>, fallback: Duration| {
        value.map(Duration::from_millis).unwrap_or(fallback)
    };

    let supervisor = SupervisorConfig {
        port_range_start: plugins
            .port_range_start
            .or(env.plugin_port_start)
            .unwrap_or(base.port_range_start),
        port_max_attempts: plugins
            .port_max_attempts
            .or(env.plugin_port_max_attempts)
            .unwrap_or(base.port_max_attempts),
        spawn_settle: millis(plugins.spawn_settle_ms, base.spawn_settle),
        health_probe_interval: millis(plugins.health_probe_interval_ms, base.health_probe_interval),
        health_probe_timeout: millis(plugins.health_probe_timeout_ms, base.health_probe_timeout),
        health_check_timeout: millis(plugins.health_check_timeout_ms, base.health_check_timeout),
        rpc_timeout: millis(plugins.rpc_timeout_ms, base.rpc_timeout),
        shutdown_rpc_timeout: millis(plugins.shutdown_rpc_timeout_ms, base.shutdown_rpc_timeout),
        terminate_grace: millis(plugins.terminate_grace_ms, base.terminate_grace),
        kill_wait: millis(plugins.kill_wait_ms, base.kill_wait),
        shutdown_all_timeout: millis(
            plugins.shutdown_all_timeout_ms.or(env.shutdown_timeout_ms),
            base.shutdown_all_timeout,
        ),
        startup_poll_interval: millis(plugins.startup_poll_interval_ms, base.startup_poll_interval),
    };

    Ok(BrokerConfig {
        host: server.host.or(env.host).unwrap_or(defaults.host),
        port: server.port.or(env.port).unwrap_or(defaults.port),
        plugins_root: plugins
            .root
            .map(PathBuf::from)
            .or(env.plugins_root)
            .unwrap_or(defaults.plugins_root),
        supervisor,
        stations_file: stations.file.map(PathBuf::from).or(env.stations_file),
    })
}
