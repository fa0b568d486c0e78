pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod plugin;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use config::{BrokerConfig, SupervisorConfig};
pub use errors::{BrokerError, BrokerResult, PluginError, PluginResult};
pub use state::AppState;
