use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values found here override
/// the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///
/// plugins:
///   root: "/opt/call-assist/plugins"
///   port_range_start: 50051
///   port_max_attempts: 100
///   health_check_timeout_ms: 2000
///   shutdown_all_timeout_ms: 10000
///
/// stations:
///   file: "/data/call_stations.yaml"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub plugins: Option<PluginsYaml>,
    pub stations: Option<StationsYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Plugin supervisor configuration from YAML
///
/// Durations are given in milliseconds.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PluginsYaml {
    /// Directory containing one subdirectory per plugin
    pub root: Option<String>,
    pub port_range_start: Option<u16>,
    pub port_max_attempts: Option<u16>,
    pub spawn_settle_ms: Option<u64>,
    pub health_probe_interval_ms: Option<u64>,
    pub health_probe_timeout_ms: Option<u64>,
    pub health_check_timeout_ms: Option<u64>,
    pub rpc_timeout_ms: Option<u64>,
    pub shutdown_rpc_timeout_ms: Option<u64>,
    pub terminate_grace_ms: Option<u64>,
    pub kill_wait_ms: Option<u64>,
    pub shutdown_all_timeout_ms: Option<u64>,
    pub startup_poll_interval_ms: Option<u64>,
}

/// Call-station source configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StationsYaml {
    /// YAML file listing the configured call stations
    pub file: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8123

plugins:
  root: "/opt/plugins"
  port_range_start: 51000
  port_max_attempts: 20
  spawn_settle_ms: 100
  health_probe_interval_ms: 250
  health_probe_timeout_ms: 750
  health_check_timeout_ms: 1500
  rpc_timeout_ms: 4000
  shutdown_rpc_timeout_ms: 3000
  terminate_grace_ms: 1000
  kill_wait_ms: 500
  shutdown_all_timeout_ms: 8000
  startup_poll_interval_ms: 200

stations:
  file: "/data/stations.yaml"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host, Some("127.0.0.1".to_string()));
        assert_eq!(server.port, Some(8123));

        let plugins = config.plugins.as_ref().unwrap();
        assert_eq!(plugins.root, Some("/opt/plugins".to_string()));
        assert_eq!(plugins.port_range_start, Some(51000));
        assert_eq!(plugins.port_max_attempts, Some(20));
        assert_eq!(plugins.startup_poll_interval_ms, Some(200));

        assert_eq!(
            config.stations.as_ref().unwrap().file,
            Some("/data/stations.yaml".to_string())
        );
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
plugins:
  kill_wait_ms: 250
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(config.server.is_none());
        assert!(config.stations.is_none());
        let plugins = config.plugins.unwrap();
        assert_eq!(plugins.kill_wait_ms, Some(250));
        assert!(plugins.root.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap_or_default();
        assert!(config.server.is_none());
        assert!(config.plugins.is_none());
    }

    #[test]
    fn test_yaml_from_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = YamlConfig::from_file(&temp_dir.path().join("missing.yaml"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
    }

    #[test]
    fn test_yaml_from_file_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "server: [unterminated").unwrap();

        let result = YamlConfig::from_file(&path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }
}
