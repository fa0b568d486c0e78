use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use call_assist_broker::{
    BrokerConfig,
    plugin::{ShutdownHook, discover_plugins},
    routes,
    state::AppState,
};

/// Call Assist broker - supervises protocol plugins and orchestrates calls
#[derive(Parser, Debug)]
#[command(name = "call-assist-broker")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the plugins found under the plugins root and exit
    Plugins,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<BrokerConfig> {
    match path {
        Some(config_path) => {
            info!(path = %config_path.display(), "Loading configuration from file");
            BrokerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))
        }
        None => BrokerConfig::from_env().map_err(|e| anyhow!(e.to_string())),
    }
}

fn print_plugins(config: &BrokerConfig) {
    let plugins = discover_plugins(&config.plugins_root);
    if plugins.is_empty() {
        println!("No plugins found under {}", config.plugins_root.display());
        return;
    }

    let mut protocols: Vec<_> = plugins.keys().cloned().collect();
    protocols.sort();
    for protocol in protocols {
        let Some(instance) = plugins.get(&protocol) else {
            continue;
        };
        let metadata = &instance.metadata;
        println!(
            "{:<12} {:<24} v{:<8} {}",
            metadata.protocol,
            metadata.name,
            metadata.version,
            instance.plugin_dir.display()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    if let Some(Commands::Plugins) = cli.command {
        print_plugins(&config);
        return Ok(());
    }

    let address = config.address();
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    let app_state = AppState::new(config);
    info!(
        plugins = app_state.supervisor.available_protocols().len(),
        stations = app_state.store.stations().len(),
        "Broker state initialized"
    );

    // First signal shuts plugins down gracefully, a second one kills them
    let hook = ShutdownHook::with_token(app_state.supervisor.clone(), app_state.shutdown.clone());
    let shutdown = hook.token();
    let hook_handle = hook.spawn();

    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app: Router = routes::api::create_api_router()
        .with_state(app_state.clone())
        .layer(cors_layer);

    let listener = TcpListener::bind(&socket_addr).await?;
    info!(address = %socket_addr, "Broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    // Server stopped without a signal: still take the plugins down
    shutdown.cancel();
    hook_handle
        .await
        .map_err(|e| anyhow!("Shutdown task failed: {}", e))?;

    info!("Broker stopped");
    Ok(())
}
