use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration values read from the environment
///
/// Every field is optional; unset variables fall through to defaults
/// during merging.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub plugins_root: Option<PathBuf>,
    pub plugin_port_start: Option<u16>,
    pub plugin_port_max_attempts: Option<u16>,
    pub stations_file: Option<PathBuf>,
    pub shutdown_timeout_ms: Option<u64>,
}

impl EnvConfig {
    /// Read the broker's environment variables
    ///
    /// # Errors
    /// Returns an error when a numeric variable is set but cannot be parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: env::var("HOST").ok(),
            port: parse_var("PORT")?,
            plugins_root: env::var("PLUGINS_ROOT").ok().map(PathBuf::from),
            plugin_port_start: parse_var("PLUGIN_PORT_START")?,
            plugin_port_max_attempts: parse_var("PLUGIN_PORT_MAX_ATTEMPTS")?,
            stations_file: env::var("STATIONS_FILE").ok().map(PathBuf::from),
            shutdown_timeout_ms: parse_var("SHUTDOWN_TIMEOUT_MS")?,
        })
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: '{raw}' ({e})").into()),
        Err(_) => Ok(None),
    }
}
