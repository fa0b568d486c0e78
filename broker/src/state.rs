use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::BrokerConfig;
use crate::core::{CallOrchestrator, EntityStore, StaticStationSource, StationSource, YamlStationSource};
use crate::plugin::{GrpcConnector, PluginConnector, PluginProxy, PluginSupervisor};

/// Shared application state handed to every handler
pub struct AppState {
    pub config: BrokerConfig,
    pub supervisor: Arc<PluginSupervisor>,
    pub proxy: PluginProxy,
    pub store: Arc<EntityStore>,
    pub orchestrator: CallOrchestrator,
    /// Cancelled when the broker begins shutting down; ends open entity streams
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the production state: gRPC plugin connector, plugins discovered
    /// under the configured root and stations from the configured file
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        let connector = Arc::new(GrpcConnector::new(config.supervisor.health_probe_timeout));
        let source: Arc<dyn StationSource> = match &config.stations_file {
            Some(path) => {
                info!(path = %path.display(), "Reading call stations from file");
                Arc::new(YamlStationSource::new(path))
            }
            None => {
                info!("No call station file configured, starting without stations");
                Arc::new(StaticStationSource::default())
            }
        };

        let state = Self::with_parts(config, connector, source);
        state.supervisor.load_plugins(&state.config.plugins_root);
        state
    }

    /// Assemble state from explicit parts without discovering plugins
    pub fn with_parts(
        config: BrokerConfig,
        connector: Arc<dyn PluginConnector>,
        source: Arc<dyn StationSource>,
    ) -> Arc<Self> {
        let supervisor = Arc::new(PluginSupervisor::new(config.supervisor.clone(), connector));
        let proxy = PluginProxy::new(supervisor.clone());
        let store = Arc::new(EntityStore::new(source));
        store.recompute();
        let orchestrator = CallOrchestrator::new(store.clone(), Arc::new(proxy.clone()));

        Arc::new(Self {
            config,
            supervisor,
            proxy,
            store,
            orchestrator,
            shutdown: CancellationToken::new(),
        })
    }
}
