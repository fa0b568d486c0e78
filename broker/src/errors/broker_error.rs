use thiserror::Error;

/// Errors from the entity store and its configuration sources.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Call-station configuration could not be read
    #[error("Failed to read call station configuration {path}: {message}")]
    StationSourceIo { path: String, message: String },

    /// Call-station configuration is malformed
    #[error("Invalid call station configuration: {0}")]
    StationSourceParse(String),

    /// Station id is not among the configured stations
    #[error("Call station '{0}' not found")]
    StationNotFound(String),

    /// Invalid broker configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;
