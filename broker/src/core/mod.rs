pub mod broadcast;
pub mod entities;
pub mod orchestrator;
pub mod stations;
pub mod store;

// Re-export commonly used types for convenience
pub use broadcast::{Broadcaster, EntitySubscription};
pub use entities::{BrokerEntityType, BrokerEntityUpdate, CallState, CallStation, HaEntity};
pub use orchestrator::{
    ActiveCall, CallDispatcher, CallOrchestrator, CallOutcome, detect_protocol, generate_call_id,
};
pub use stations::{StaticStationSource, StationConfig, StationSource, YamlStationSource};
pub use store::{BrokerHealth, EntityStore, StationUnavailable};
