pub mod broker_error;
pub mod plugin_error;

pub use broker_error::{BrokerError, BrokerResult};
pub use plugin_error::{PluginError, PluginResult};
