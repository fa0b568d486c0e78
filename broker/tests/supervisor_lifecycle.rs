//! Supervisor Lifecycle Tests
//!
//! Drives `PluginSupervisor` with real child processes and a scripted RPC
//! connector: start, restart, failed starts, idempotent stops and bulk
//! shutdown.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use call_assist_broker::plugin::{PluginState, PluginSupervisor};

use common::{ScriptedConnector, ScriptedPlugin, fast_config, plugin, sleeper};

fn supervisor() -> (Arc<PluginSupervisor>, Arc<ScriptedConnector>) {
    let connector = ScriptedConnector::new();
    let supervisor = Arc::new(PluginSupervisor::new(fast_config(), connector.clone()));
    (supervisor, connector)
}

#[tokio::test]
async fn test_missing_program_never_reaches_running() {
    let (supervisor, connector) = supervisor();
    supervisor.register(plugin("ghost", &["/nonexistent/call-assist-plugin"], &[]));

    assert!(!supervisor.ensure_running("ghost").await);
    assert_eq!(supervisor.plugin_state("ghost"), Some(PluginState::Error));
    assert!(supervisor.last_error("ghost").is_some());
    assert!(supervisor.client("ghost").is_none());
    assert!(connector.ports().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_unhealthy_plugin_ends_in_error() {
    let (supervisor, connector) = supervisor();
    connector.plugin.healthy.store(false, Ordering::SeqCst);
    supervisor.register(sleeper("sick", &[]));

    assert!(!supervisor.ensure_running("sick").await);
    assert_eq!(supervisor.plugin_state("sick"), Some(PluginState::Error));
    let error = supervisor.last_error("sick").unwrap();
    assert!(error.contains("unhealthy"), "unexpected error: {error}");

    // health_check_timeout = 1 gives two probes
    assert_eq!(ScriptedPlugin::count(&connector.plugin.health_calls), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_exiting_during_startup_is_error() {
    let (supervisor, connector) = supervisor();
    // A probe must never mask the exit
    connector.plugin.healthy.store(false, Ordering::SeqCst);
    supervisor.register(plugin("quitter", &["sh", "-c", "exit 3"], &[]));

    assert!(!supervisor.ensure_running("quitter").await);
    assert_eq!(supervisor.plugin_state("quitter"), Some(PluginState::Error));
    let error = supervisor.last_error("quitter").unwrap();
    assert!(error.contains('3'), "unexpected error: {error}");
    assert!(supervisor.client("quitter").is_none());
    assert!(connector.ports().len() <= 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_start_can_be_retried() {
    let (supervisor, connector) = supervisor();
    connector.plugin.healthy.store(false, Ordering::SeqCst);
    supervisor.register(sleeper("flaky", &[]));

    assert!(!supervisor.ensure_running("flaky").await);
    assert_eq!(supervisor.plugin_state("flaky"), Some(PluginState::Error));

    connector.plugin.healthy.store(true, Ordering::SeqCst);
    assert!(supervisor.ensure_running("flaky").await);
    assert_eq!(supervisor.plugin_state("flaky"), Some(PluginState::Running));
    assert!(supervisor.last_error("flaky").is_none());

    supervisor.stop("flaky").await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_start_stop_start_reprobes_port() {
    let (supervisor, connector) = supervisor();
    supervisor.register(sleeper("cycle", &[]));

    assert!(supervisor.ensure_running("cycle").await);
    let first_port = supervisor.plugin_info("cycle").unwrap().grpc.port;

    supervisor.stop("cycle").await;
    assert_eq!(supervisor.plugin_state("cycle"), Some(PluginState::Stopped));

    supervisor.start("cycle").await.unwrap();
    assert_eq!(supervisor.plugin_state("cycle"), Some(PluginState::Running));
    let second_port = supervisor.plugin_info("cycle").unwrap().grpc.port;

    // One connect per start, each to the port probed for that start
    assert_eq!(connector.ports(), vec![first_port, second_port]);
    let config = supervisor.config();
    let range = config.port_range_start..config.port_range_start + config.port_max_attempts;
    assert!(range.contains(&first_port));
    assert!(range.contains(&second_port));

    supervisor.stop("cycle").await;
}

#[tokio::test]
async fn test_health_check_without_process_is_false() {
    let (supervisor, _) = supervisor();
    supervisor.register(sleeper("idle", &[]));

    assert!(!supervisor.health_check("idle").await);
    assert!(!supervisor.health_check("unknown").await);
    assert_eq!(supervisor.plugin_state("idle"), Some(PluginState::Stopped));
}

#[tokio::test]
async fn test_stop_twice_on_stopped_plugin_is_noop() {
    let (supervisor, connector) = supervisor();
    supervisor.register(sleeper("quiet", &[]));

    supervisor.stop("quiet").await;
    supervisor.stop("quiet").await;

    assert_eq!(supervisor.plugin_state("quiet"), Some(PluginState::Stopped));
    assert_eq!(ScriptedPlugin::count(&connector.plugin.shutdown_calls), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_running_plugin_that_turns_unhealthy_is_restarted() {
    let (supervisor, connector) = supervisor();
    supervisor.register(sleeper("wobbly", &[]));

    assert!(supervisor.ensure_running("wobbly").await);
    assert!(supervisor.health_check("wobbly").await);

    connector.plugin.healthy.store(false, Ordering::SeqCst);
    assert!(!supervisor.health_check("wobbly").await);

    // Healthy again: no relaunch
    connector.plugin.healthy.store(true, Ordering::SeqCst);
    assert!(supervisor.ensure_running("wobbly").await);
    assert_eq!(connector.ports().len(), 1);

    // Failed health check: stop, relaunch, relaunch fails its probes
    connector.plugin.healthy.store(false, Ordering::SeqCst);
    assert!(!supervisor.ensure_running("wobbly").await);
    assert_eq!(connector.ports().len(), 2);
    assert_eq!(supervisor.plugin_state("wobbly"), Some(PluginState::Error));
}

#[cfg(unix)]
#[tokio::test]
async fn test_concurrent_ensure_running_spawns_once() {
    let (supervisor, connector) = supervisor();
    supervisor.register(sleeper("shared", &[]));

    let (a, b) = tokio::join!(
        supervisor.ensure_running("shared"),
        supervisor.ensure_running("shared")
    );

    assert!(a && b);
    assert_eq!(connector.ports().len(), 1);
    supervisor.stop("shared").await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_shutdown_all_stops_everything() {
    let (supervisor, connector) = supervisor();
    supervisor.register(sleeper("matrix", &[]));
    supervisor.register(sleeper("xmpp", &[]));

    assert!(supervisor.ensure_running("matrix").await);
    assert!(supervisor.ensure_running("xmpp").await);

    supervisor.shutdown_all().await;

    assert_eq!(supervisor.plugin_state("matrix"), Some(PluginState::Stopped));
    assert_eq!(supervisor.plugin_state("xmpp"), Some(PluginState::Stopped));
    assert_eq!(ScriptedPlugin::count(&connector.plugin.shutdown_calls), 2);

    // Further starts are refused once shutdown began
    assert!(!supervisor.ensure_running("matrix").await);

    // Idempotent
    supervisor.shutdown_all().await;
}
