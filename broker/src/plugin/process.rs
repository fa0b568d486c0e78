//! OS process handle for a running plugin
//!
//! The child is shared behind a short-lived lock so the async stop path and
//! the synchronous emergency cleanup can both reach it. Exit is observed by
//! polling `try_wait`, never by awaiting under the lock.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use call_assist_plugin_api::PORT_ENV;

use crate::errors::{PluginError, PluginResult};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle to a spawned plugin process
#[derive(Clone)]
pub struct PluginProcess {
    child: Arc<Mutex<Child>>,
    pid: Option<u32>,
    port: u16,
}

impl PluginProcess {
    /// Spawn `command` in `working_dir` with the gRPC port exported as `PORT`
    pub fn spawn(command: &[String], working_dir: &Path, port: u16) -> PluginResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| PluginError::SpawnFailed("empty command".to_string()))?;

        let child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .env(PORT_ENV, port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                PluginError::SpawnFailed(format!(
                    "{program} in {}: {e}",
                    working_dir.display()
                ))
            })?;

        let pid = child.id();
        debug!(program = %program, pid = ?pid, port = port, "Spawned plugin process");

        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            pid,
            port,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Exit status if the process has already exited
    pub fn exit_status(&self) -> PluginResult<Option<ExitStatus>> {
        self.child
            .lock()
            .try_wait()
            .map_err(|e| PluginError::Process(e.to_string()))
    }

    /// Whether the process is still running
    ///
    /// A failing `try_wait` is treated as "gone".
    pub fn is_alive(&self) -> bool {
        matches!(self.exit_status(), Ok(None))
    }

    /// Ask the process to exit (SIGTERM on unix)
    pub fn terminate(&self) -> PluginResult<()> {
        if !self.is_alive() {
            return Ok(());
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // SAFETY: `kill` has no memory-safety preconditions. The pid
            // belongs to a child that has not been reaped yet.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                return Err(PluginError::Process(format!("SIGTERM {pid}: {err}")));
            }
            return Ok(());
        }

        self.kill()
    }

    /// Force the process to exit (SIGKILL on unix)
    pub fn kill(&self) -> PluginResult<()> {
        let mut child = self.child.lock();
        match child.try_wait() {
            Ok(Some(_)) => Ok(()),
            _ => child
                .start_kill()
                .map_err(|e| PluginError::Process(e.to_string())),
        }
    }

    /// Poll until the process exits or `timeout` elapses
    ///
    /// Returns `true` if the process is gone.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Blocking variant of [`wait_for_exit`](Self::wait_for_exit)
    pub fn wait_for_exit_blocking(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    /// SIGTERM, wait `grace`, then SIGKILL and wait `kill_wait`
    pub async fn terminate_gracefully(&self, grace: Duration, kill_wait: Duration) {
        if let Err(e) = self.terminate() {
            warn!(pid = ?self.pid, error = %e, "Failed to terminate plugin process");
        }
        if self.wait_for_exit(grace).await {
            return;
        }

        warn!(pid = ?self.pid, "Plugin process ignored SIGTERM, killing");
        if let Err(e) = self.kill() {
            warn!(pid = ?self.pid, error = %e, "Failed to kill plugin process");
        }
        if !self.wait_for_exit(kill_wait).await {
            warn!(pid = ?self.pid, "Plugin process still alive after SIGKILL");
        }
    }

    /// Blocking variant of [`terminate_gracefully`](Self::terminate_gracefully)
    pub fn terminate_blocking(&self, grace: Duration, kill_wait: Duration) {
        if let Err(e) = self.terminate() {
            warn!(pid = ?self.pid, error = %e, "Failed to terminate plugin process");
        }
        if self.wait_for_exit_blocking(grace) {
            return;
        }
        if let Err(e) = self.kill() {
            warn!(pid = ?self.pid, error = %e, "Failed to kill plugin process");
        }
        self.wait_for_exit_blocking(kill_wait);
    }
}

/// Human readable description of an exit status
pub fn describe_exit(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return format!("signal {signal}");
                }
            }
            "unknown".to_string()
        }
    }
}

impl std::fmt::Debug for PluginProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginProcess")
            .field("pid", &self.pid)
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_spawn_exports_port() {
        let dir = tempfile::TempDir::new().unwrap();
        let process =
            PluginProcess::spawn(&sh("echo $PORT > port.txt"), dir.path(), 50123).unwrap();

        assert!(process.wait_for_exit(Duration::from_secs(5)).await);
        let written = std::fs::read_to_string(dir.path().join("port.txt")).unwrap();
        assert_eq!(written.trim(), "50123");
        assert_eq!(process.port(), 50123);
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let process = PluginProcess::spawn(&sh("exit 3"), dir.path(), 50000).unwrap();

        assert!(process.wait_for_exit(Duration::from_secs(5)).await);
        let status = process.exit_status().unwrap().unwrap();
        assert_eq!(describe_exit(&status), "3");
    }

    #[tokio::test]
    async fn test_terminate_long_running() {
        let dir = tempfile::TempDir::new().unwrap();
        let process = PluginProcess::spawn(&sh("sleep 30"), dir.path(), 50000).unwrap();
        assert!(process.is_alive());

        process
            .terminate_gracefully(Duration::from_secs(2), Duration::from_secs(1))
            .await;
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_kill_escalation_when_sigterm_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let process =
            PluginProcess::spawn(&sh("trap '' TERM; sleep 30"), dir.path(), 50000).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        process
            .terminate_gracefully(Duration::from_millis(300), Duration::from_secs(2))
            .await;
        assert!(!process.is_alive());
    }

    #[test]
    fn test_spawn_missing_program() {
        let dir = tempfile::TempDir::new().unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();

        let result = PluginProcess::spawn(
            &["/definitely/not/a/program".to_string()],
            dir.path(),
            50000,
        );
        assert!(matches!(result, Err(PluginError::SpawnFailed(_))));
    }

    #[test]
    fn test_spawn_empty_command() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            PluginProcess::spawn(&[], dir.path(), 50000),
            Err(PluginError::SpawnFailed(_))
        ));
    }
}
