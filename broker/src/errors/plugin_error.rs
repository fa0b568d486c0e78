//! Errors raised while discovering, launching and talking to plugin processes.
//!
//! These never cross the proxy boundary: the supervisor records them as the
//! plugin's `last_error` and the proxy turns them into `false` / `None`.

use std::time::Duration;

/// Plugin-specific error type
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Descriptor file could not be read
    #[error("Failed to read plugin descriptor {path}: {message}")]
    DescriptorIo { path: String, message: String },

    /// Descriptor parsed but is structurally invalid
    #[error("Invalid plugin metadata structure: {0}")]
    InvalidMetadata(String),

    /// No bindable port in the probed range
    #[error("Could not find an available port in range {start}-{end}")]
    NoPortAvailable { start: u16, end: u32 },

    /// Process could not be spawned
    #[error("Failed to spawn plugin process: {0}")]
    SpawnFailed(String),

    /// Process exited before it was confirmed alive
    #[error("Plugin process exited during startup (status {0})")]
    ProcessExited(String),

    /// RPC channel could not be created
    #[error("Failed to connect to plugin: {0}")]
    ConnectionFailed(String),

    /// RPC returned an error status
    #[error("Plugin RPC failed: {0}")]
    Rpc(String),

    /// RPC or wait exceeded its budget
    #[error("Plugin operation timed out after {0:?}")]
    Timeout(Duration),

    /// Plugin answered a health probe but reported itself unhealthy
    #[error("Plugin reported unhealthy: {0}")]
    Unhealthy(String),

    /// Protocol has no registered plugin
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// Required credential keys were not supplied
    #[error("Missing required credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    /// OS-level process management failure
    #[error("Process error: {0}")]
    Process(String),
}

impl From<tonic::Status> for PluginError {
    fn from(status: tonic::Status) -> Self {
        PluginError::Rpc(format!("{:?}: {}", status.code(), status.message()))
    }
}

impl From<tonic::transport::Error> for PluginError {
    fn from(error: tonic::transport::Error) -> Self {
        PluginError::ConnectionFailed(error.to_string())
    }
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_message() {
        let err = PluginError::MissingCredentials(vec!["token".to_string(), "user".to_string()]);
        assert_eq!(err.to_string(), "Missing required credentials: token, user");
    }

    #[test]
    fn test_status_conversion_keeps_code() {
        let err: PluginError = tonic::Status::unavailable("connection refused").into();
        let msg = err.to_string();
        assert!(msg.contains("Unavailable"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_port_range_message() {
        let err = PluginError::NoPortAvailable {
            start: 50051,
            end: 50151,
        };
        assert!(err.to_string().contains("50051-50151"));
    }
}
