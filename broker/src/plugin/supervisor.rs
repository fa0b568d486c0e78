//! Plugin Process Supervisor
//!
//! Owns the protocol -> [`PluginInstance`] registry and drives every state
//! transition: spawn, connect, health probing, graceful then forced stop,
//! bulk shutdown and the synchronous emergency kill path.
//!
//! # Locking
//!
//! Each instance sits behind its own `parking_lot::Mutex`. The lock is only
//! taken for short synchronous reads and writes and is never held across an
//! `.await`. A start attempt claims the instance by flipping it to
//! `Starting` under the lock and stamping a fresh start generation, so
//! concurrent `ensure_running` callers observe `Starting` and poll instead
//! of spawning a second process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{PluginClient, PluginConnector, with_timeout};
use super::discovery::discover_plugins;
use super::lifecycle::{PluginConfiguration, PluginInstance, PluginState};
use super::metadata::{CapabilitiesConfig, PluginMetadata};
use super::port::find_available_port;
use super::process::{PluginProcess, describe_exit};
use crate::config::SupervisorConfig;
use crate::errors::{PluginError, PluginResult};

type SharedInstance = Arc<Mutex<PluginInstance>>;

/// Outcome of trying to claim a plugin for a start attempt
enum StartClaim {
    Claimed(u64),
    InProgress,
    AlreadyRunning,
    Busy(PluginState),
}

/// Supervisor for all plugin processes of one broker
pub struct PluginSupervisor {
    config: SupervisorConfig,
    plugins: RwLock<HashMap<String, SharedInstance>>,
    connector: Arc<dyn PluginConnector>,
    /// Set once a bulk shutdown or emergency cleanup has begun
    shutdown_requested: AtomicBool,
    /// Emergency cleanup runs at most once
    emergency_done: AtomicBool,
}

impl PluginSupervisor {
    pub fn new(config: SupervisorConfig, connector: Arc<dyn PluginConnector>) -> Self {
        Self {
            config,
            plugins: RwLock::new(HashMap::new()),
            connector,
            shutdown_requested: AtomicBool::new(false),
            emergency_done: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Discover plugins under `root` and register them
    ///
    /// Returns the number of plugins registered.
    pub fn load_plugins(&self, root: &Path) -> usize {
        let discovered = discover_plugins(root);
        let count = discovered.len();
        for (_, instance) in discovered {
            self.register(instance);
        }
        info!(root = %root.display(), count = count, "Loaded plugins");
        count
    }

    /// Register a single plugin instance, replacing any with the same protocol
    pub fn register(&self, instance: PluginInstance) {
        let protocol = instance.protocol().to_string();
        self.plugins
            .write()
            .insert(protocol, Arc::new(Mutex::new(instance)));
    }

    fn instance(&self, protocol: &str) -> Option<SharedInstance> {
        self.plugins.read().get(protocol).cloned()
    }

    fn instances(&self) -> Vec<SharedInstance> {
        self.plugins.read().values().cloned().collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Make sure the plugin for `protocol` is running and healthy
    ///
    /// Never fails loudly: every problem is logged, recorded as the plugin's
    /// last error and reported as `false`.
    pub async fn ensure_running(&self, protocol: &str) -> bool {
        let Some(instance) = self.instance(protocol) else {
            warn!(protocol = %protocol, "No plugin registered for protocol");
            return false;
        };

        if self.is_shutting_down() {
            debug!(protocol = %protocol, "Shutdown in progress, not starting plugin");
            return false;
        }

        let state = instance.lock().state;
        match state {
            PluginState::Running => {
                if self.health_check(protocol).await {
                    return true;
                }
                warn!(protocol = %protocol, "Running plugin failed health check, restarting");
                self.stop_instance(&instance).await;
                self.start_instance(&instance).await.is_ok()
            }
            PluginState::Starting => self.wait_for_startup(&instance).await,
            PluginState::Stopping => {
                warn!(protocol = %protocol, "Plugin is stopping");
                false
            }
            PluginState::Stopped | PluginState::Error => {
                self.start_instance(&instance).await.is_ok()
            }
        }
    }

    /// Start the plugin for `protocol`
    ///
    /// Already running is success. A start already in progress is awaited.
    pub async fn start(&self, protocol: &str) -> PluginResult<()> {
        let instance = self
            .instance(protocol)
            .ok_or_else(|| PluginError::NotFound(protocol.to_string()))?;
        self.start_instance(&instance).await
    }

    async fn start_instance(&self, instance: &SharedInstance) -> PluginResult<()> {
        let claim = {
            let mut guard = instance.lock();
            match guard.state {
                PluginState::Running => StartClaim::AlreadyRunning,
                PluginState::Starting => StartClaim::InProgress,
                PluginState::Stopping => StartClaim::Busy(guard.state),
                PluginState::Stopped | PluginState::Error => match guard.begin_start() {
                    Some(generation) => StartClaim::Claimed(generation),
                    None => StartClaim::Busy(guard.state),
                },
            }
        };

        match claim {
            StartClaim::Claimed(generation) => {
                let mut attempt = StartAttempt::new(instance.clone(), generation);
                let result = self.launch(instance, generation).await;
                attempt.finish(&result);
                result
            }
            StartClaim::InProgress => {
                if self.wait_for_startup(instance).await {
                    Ok(())
                } else {
                    let guard = instance.lock();
                    Err(PluginError::Process(
                        guard
                            .last_error
                            .clone()
                            .unwrap_or_else(|| format!("plugin did not start ({})", guard.state)),
                    ))
                }
            }
            StartClaim::AlreadyRunning => Ok(()),
            StartClaim::Busy(state) => Err(PluginError::Process(format!(
                "cannot start plugin while {state}"
            ))),
        }
    }

    /// Spawn, connect and probe one claimed start attempt
    async fn launch(&self, instance: &SharedInstance, generation: u64) -> PluginResult<()> {
        let (protocol, command, working_dir, probe_attempts) = {
            let guard = instance.lock();
            (
                guard.protocol().to_string(),
                guard.metadata.executable.command.clone(),
                guard.working_dir(),
                guard
                    .metadata
                    .grpc
                    .health_check_timeout
                    .saturating_mul(2)
                    .max(1),
            )
        };

        info!(protocol = %protocol, "Starting plugin");

        // Allocate right before spawning to keep the bind race short
        let port = find_available_port(self.config.port_range_start, self.config.port_max_attempts)?;
        let process = PluginProcess::spawn(&command, &working_dir, port)?;

        commit(instance, generation, &process, |guard| {
            guard.metadata.grpc.port = port;
            guard.process = Some(process.clone());
        })?;

        tokio::time::sleep(self.config.spawn_settle).await;
        if let Some(status) = process.exit_status()? {
            return Err(PluginError::ProcessExited(describe_exit(&status)));
        }

        let client = self.connector.connect(port)?;
        commit(instance, generation, &process, |guard| {
            guard.client = Some(client.clone());
        })?;

        self.probe_until_healthy(&protocol, client.as_ref(), &process, probe_attempts)
            .await?;

        commit(instance, generation, &process, |guard| {
            guard.state = PluginState::Running;
            guard.last_error = None;
        })?;

        info!(protocol = %protocol, port = port, pid = ?process.pid(), "Plugin running");
        Ok(())
    }

    async fn probe_until_healthy(
        &self,
        protocol: &str,
        client: &dyn PluginClient,
        process: &PluginProcess,
        attempts: u64,
    ) -> PluginResult<()> {
        let mut last_error = PluginError::Timeout(self.config.health_probe_timeout);

        for attempt in 1..=attempts {
            match with_timeout(self.config.health_probe_timeout, client.health()).await {
                Ok(response) if response.healthy => return Ok(()),
                Ok(response) => last_error = PluginError::Unhealthy(response.message),
                Err(e) => last_error = e,
            }
            debug!(
                protocol = %protocol,
                attempt = attempt,
                attempts = attempts,
                error = %last_error,
                "Plugin health probe failed"
            );

            if let Some(status) = process.exit_status()? {
                return Err(PluginError::ProcessExited(describe_exit(&status)));
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.health_probe_interval).await;
            }
        }

        Err(last_error)
    }

    /// Poll a concurrent start attempt until it settles or the plugin's
    /// startup timeout passes
    async fn wait_for_startup(&self, instance: &SharedInstance) -> bool {
        let (protocol, timeout) = {
            let guard = instance.lock();
            (
                guard.protocol().to_string(),
                guard.metadata.grpc.startup_timeout(),
            )
        };
        // An unrepresentable deadline means waiting for the start to settle
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let state = instance.lock().state;
            match state {
                PluginState::Running => return true,
                PluginState::Error | PluginState::Stopped => return false,
                PluginState::Starting | PluginState::Stopping => {}
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(protocol = %protocol, timeout = ?timeout, "Timed out waiting for plugin startup");
                return false;
            }
            tokio::time::sleep(self.config.startup_poll_interval).await;
        }
    }

    /// Stop the plugin for `protocol`; a no-op when already stopped
    pub async fn stop(&self, protocol: &str) {
        if let Some(instance) = self.instance(protocol) {
            self.stop_instance(&instance).await;
        }
    }

    async fn stop_instance(&self, instance: &SharedInstance) {
        let (protocol, process, client) = {
            let mut guard = instance.lock();
            match guard.state {
                PluginState::Stopped | PluginState::Stopping => return,
                _ => {}
            }
            guard.state = PluginState::Stopping;
            (
                guard.protocol().to_string(),
                guard.process.clone(),
                guard.client.clone(),
            )
        };

        info!(protocol = %protocol, "Stopping plugin");

        if let Some(client) = client {
            if let Err(e) = with_timeout(self.config.shutdown_rpc_timeout, client.shutdown()).await
            {
                warn!(protocol = %protocol, error = %e, "Graceful shutdown RPC failed");
            }
        }

        if let Some(process) = process {
            process
                .terminate_gracefully(self.config.terminate_grace, self.config.kill_wait)
                .await;
        }

        instance.lock().reset();
        info!(protocol = %protocol, "Plugin stopped");
    }

    /// Bounded health RPC against a running plugin
    ///
    /// Any failure, including a missing client, reads as unhealthy.
    pub async fn health_check(&self, protocol: &str) -> bool {
        let client = match self.instance(protocol) {
            Some(instance) => instance.lock().client.clone(),
            None => None,
        };
        let Some(client) = client else {
            return false;
        };

        match with_timeout(self.config.health_check_timeout, client.health()).await {
            Ok(response) => {
                if !response.healthy {
                    debug!(protocol = %protocol, message = %response.message, "Plugin reports unhealthy");
                }
                response.healthy
            }
            Err(e) => {
                debug!(protocol = %protocol, error = %e, "Plugin health check failed");
                false
            }
        }
    }

    /// Stop every running or starting plugin concurrently
    ///
    /// Bounded by `shutdown_all_timeout`; whatever is still alive afterwards
    /// is killed without waiting. Only the first call does any work.
    pub async fn shutdown_all(&self) {
        if self
            .shutdown_requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Plugin shutdown already in progress");
            return;
        }

        let targets: Vec<SharedInstance> = self
            .instances()
            .into_iter()
            .filter(|instance| {
                matches!(
                    instance.lock().state,
                    PluginState::Running | PluginState::Starting
                )
            })
            .collect();

        info!(count = targets.len(), "Shutting down plugins");

        let stops = join_all(targets.iter().map(|instance| self.stop_instance(instance)));
        if tokio::time::timeout(self.config.shutdown_all_timeout, stops)
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.config.shutdown_all_timeout,
                "Plugin shutdown timed out, killing remaining processes"
            );
            for instance in &targets {
                force_kill(instance);
            }
        }

        info!("All plugins shut down");
    }

    /// Synchronous best-effort termination of every tracked child process
    ///
    /// Skips graceful RPC shutdown. Runs at most once per supervisor.
    pub fn emergency_cleanup(&self) {
        if self.emergency_done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown_requested.store(true, Ordering::SeqCst);

        for instance in self.instances() {
            let (protocol, process) = {
                let mut guard = instance.lock();
                let process = guard.process.take();
                if process.is_some() || guard.state.has_process() {
                    guard.reset();
                }
                (guard.protocol().to_string(), process)
            };

            if let Some(process) = process {
                if process.is_alive() {
                    warn!(protocol = %protocol, pid = ?process.pid(), "Emergency plugin termination");
                    process.terminate_blocking(self.config.terminate_grace, self.config.kill_wait);
                }
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Client of a running plugin
    pub fn client(&self, protocol: &str) -> Option<Arc<dyn PluginClient>> {
        let instance = self.instance(protocol)?;
        let guard = instance.lock();
        if guard.state.is_running() {
            guard.client.clone()
        } else {
            None
        }
    }

    /// Protocols of every registered plugin, sorted
    pub fn available_protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self.plugins.read().keys().cloned().collect();
        protocols.sort();
        protocols
    }

    pub fn plugin_state(&self, protocol: &str) -> Option<PluginState> {
        self.instance(protocol).map(|instance| instance.lock().state)
    }

    pub fn plugin_info(&self, protocol: &str) -> Option<PluginMetadata> {
        self.instance(protocol)
            .map(|instance| instance.lock().metadata.clone())
    }

    pub fn plugin_capabilities(&self, protocol: &str) -> Option<CapabilitiesConfig> {
        self.instance(protocol)
            .map(|instance| instance.lock().metadata.capabilities.clone())
    }

    pub fn plugin_configuration(&self, protocol: &str) -> Option<PluginConfiguration> {
        self.instance(protocol)
            .and_then(|instance| instance.lock().configuration.clone())
    }

    pub fn last_error(&self, protocol: &str) -> Option<String> {
        self.instance(protocol)
            .and_then(|instance| instance.lock().last_error.clone())
    }

    /// Metadata of every registered plugin, sorted by protocol
    pub fn all_metadata(&self) -> Vec<PluginMetadata> {
        let mut all: Vec<PluginMetadata> = self
            .instances()
            .iter()
            .map(|instance| instance.lock().metadata.clone())
            .collect();
        all.sort_by(|a, b| a.protocol.cmp(&b.protocol));
        all
    }

    /// Remember an acknowledged account initialization
    pub fn record_configuration(&self, configuration: PluginConfiguration) {
        if let Some(instance) = self.instance(&configuration.protocol) {
            instance.lock().configuration = Some(configuration);
        }
    }
}

impl Drop for PluginSupervisor {
    fn drop(&mut self) {
        self.emergency_cleanup();
    }
}

/// Apply `update` only if the start attempt still owns the instance
///
/// A superseded attempt terminates the process it spawned.
fn commit<F>(
    instance: &SharedInstance,
    generation: u64,
    process: &PluginProcess,
    update: F,
) -> PluginResult<()>
where
    F: FnOnce(&mut PluginInstance),
{
    let mut guard = instance.lock();
    if guard.owns_start(generation) {
        update(&mut *guard);
        return Ok(());
    }
    drop(guard);

    if let Err(e) = process.terminate() {
        warn!(pid = ?process.pid(), error = %e, "Failed to terminate superseded plugin process");
    }
    Err(PluginError::Process("start attempt was superseded".to_string()))
}

fn force_kill(instance: &SharedInstance) {
    let mut guard = instance.lock();
    if let Some(process) = guard.process.take() {
        if let Err(e) = process.kill() {
            warn!(protocol = %guard.protocol(), error = %e, "Failed to kill plugin process");
        }
    }
    guard.reset();
}

/// Settles a claimed start attempt
///
/// On failure, or if the attempt future is dropped before finishing, the
/// instance moves to `Error` and its process and client references are
/// released. A process that is still alive receives a terminate signal.
struct StartAttempt {
    instance: SharedInstance,
    generation: u64,
    settled: bool,
}

impl StartAttempt {
    fn new(instance: SharedInstance, generation: u64) -> Self {
        Self {
            instance,
            generation,
            settled: false,
        }
    }

    fn finish(&mut self, result: &PluginResult<()>) {
        self.settled = true;
        if let Err(e) = result {
            self.abandon(&e.to_string());
        }
    }

    fn abandon(&self, message: &str) {
        let mut guard = self.instance.lock();
        if !guard.owns_start(self.generation) {
            return;
        }

        error!(protocol = %guard.protocol(), error = %message, "Plugin failed to start");
        if let Some(process) = guard.process.take() {
            if process.is_alive() {
                if let Err(e) = process.terminate() {
                    warn!(pid = ?process.pid(), error = %e, "Failed to terminate plugin process");
                }
            }
        }
        guard.client = None;
        guard.fail(message);
    }
}

impl Drop for StartAttempt {
    fn drop(&mut self) {
        if !self.settled {
            self.abandon("start attempt cancelled");
        }
    }
}

// =============================================================================
// Shutdown hook
// =============================================================================

/// Process-wide termination handling for a supervisor
///
/// The first Ctrl+C / SIGTERM cancels [`token`](Self::token) and runs
/// [`PluginSupervisor::shutdown_all`]. A second signal while that is still
/// running switches to [`PluginSupervisor::emergency_cleanup`].
pub struct ShutdownHook {
    supervisor: Arc<PluginSupervisor>,
    token: CancellationToken,
}

impl ShutdownHook {
    pub fn new(supervisor: Arc<PluginSupervisor>) -> Self {
        Self::with_token(supervisor, CancellationToken::new())
    }

    /// Share an existing token, e.g. one that open HTTP streams also watch
    pub fn with_token(supervisor: Arc<PluginSupervisor>, token: CancellationToken) -> Self {
        Self { supervisor, token }
    }

    /// Cancelled as soon as the first termination signal arrives
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Install the signal listener
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => info!("Shutdown signal received"),
                _ = self.token.cancelled() => info!("Shutdown requested"),
            }
            self.token.cancel();
            self.run().await;
        })
    }

    /// Controlled shutdown path, also used when no signal is involved
    pub async fn run(&self) {
        tokio::select! {
            _ = self.supervisor.shutdown_all() => {}
            _ = wait_for_signal() => {
                warn!("Second shutdown signal, killing plugins");
                let supervisor = self.supervisor.clone();
                if let Err(e) =
                    tokio::task::spawn_blocking(move || supervisor.emergency_cleanup()).await
                {
                    error!(error = %e, "Emergency plugin cleanup panicked");
                }
            }
        }
    }
}

/// Wait for Ctrl+C, or SIGTERM on unix
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, only Ctrl+C will stop the broker");
                None
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => { sig.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
