//! Plugin system for the Call Assist broker
//!
//! Every communication protocol is served by a separate plugin process that
//! implements the `CallPlugin` gRPC contract from `call-assist-plugin-api`.
//!
//! # Architecture
//!
//! ```text
//! plugins/<dir>/plugin.yaml
//!         |
//!         v
//!   discovery ──▶ PluginSupervisor ──▶ PluginProcess (child, PORT=<n>)
//!                      │    ▲
//!                      │    └── health / shutdown RPCs
//!                      v
//!                 PluginProxy ──▶ initialize / start call / end call RPCs
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use call_assist_broker::plugin::{GrpcConnector, PluginProxy, PluginSupervisor};
//!
//! let supervisor = Arc::new(PluginSupervisor::new(config, Arc::new(GrpcConnector::default())));
//! supervisor.load_plugins(Path::new("./plugins"));
//!
//! let proxy = PluginProxy::new(supervisor.clone());
//! proxy.initialize_account("matrix", "@me:example.org", "Me", credentials).await;
//! ```

pub mod client;
pub mod discovery;
pub mod lifecycle;
pub mod metadata;
pub mod port;
pub mod process;
pub mod proxy;
pub mod supervisor;

pub use client::{GrpcConnector, GrpcPluginClient, PluginClient, PluginConnector};
pub use discovery::discover_plugins;
pub use lifecycle::{PluginConfiguration, PluginInstance, PluginState};
pub use metadata::{
    CapabilitiesConfig, ExecutableConfig, ExecutableKind, FieldDefinition, FieldType,
    PluginMetadata, ResolutionConfig, RpcConfig,
};
pub use port::find_available_port;
pub use process::PluginProcess;
pub use proxy::{PluginProxy, ProtocolSchema};
pub use supervisor::{PluginSupervisor, ShutdownHook};
