//! Local tool-server process supervision.
//!
//! The supervisor spawns the tool server with an injected host/port pair,
//! polls it until it answers, and guarantees the child is terminated and
//! reaped on stop. Every failure is reported through logs only: a missing
//! tool server degrades the session, it never aborts it.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

use super::state::{SupervisorError, SupervisorState};
use super::stderr::{StderrTail, spawn_drain};

/// Environment variable carrying the bind host into the child.
pub const HOST_ENV_VAR: &str = "TOOL_SERVER_HOST";

/// Environment variable carrying the bind port into the child.
pub const PORT_ENV_VAR: &str = "TOOL_SERVER_PORT";

/// Maximum stderr bytes kept for a crash report.
pub const MAX_STDERR_BYTES: usize = 2000;

/// How long to wait for the rest of an exited process's stderr.
const STDERR_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration of the supervised tool server.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Whether the local tool server should be started at all
    pub enabled: bool,

    /// Program to execute
    pub command: Option<String>,

    /// Program arguments
    pub args: Vec<String>,

    /// Extra environment for the child
    pub env: HashMap<String, String>,

    /// Host the server binds to
    pub host: String,

    /// Port the server binds to
    pub port: u16,

    /// Path of the tool-protocol endpoint used for the readiness check
    pub ready_path: String,

    /// Upper bound on the readiness wait
    pub max_wait: Duration,

    /// Delay between readiness checks
    pub poll_interval: Duration,

    /// Grace period between the termination signal and the forced kill
    pub stop_timeout: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            host: "127.0.0.1".to_string(),
            port: 8081,
            ready_path: "/mcp".to_string(),
            max_wait: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl ProcessConfig {
    /// Base URL the router should use for this server.
    ///
    /// A wildcard bind address is reached through loopback.
    pub fn base_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }

    /// URL checked for readiness.
    pub fn ready_url(&self) -> String {
        let path = if self.ready_path.starts_with('/') {
            self.ready_path.clone()
        } else {
            format!("/{}", self.ready_path)
        };
        format!("{}{}", self.base_url(), path)
    }
}

/// Lifecycle facts shared between the supervisor and its exit watcher.
#[derive(Debug, Default)]
struct ChildStatus {
    state: SupervisorState,
    pid: Option<u32>,
    exit_code: Option<i32>,
    /// The child exited without being asked to
    exited: bool,
}

/// Background task owning a ready child until it exits or is stopped.
struct ExitWatcher {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owner of at most one tool-server child process.
///
/// While starting, the supervisor holds the child itself. Once the server is
/// ready the child moves to an exit watcher, so a crash is noticed and
/// reported without anyone polling.
pub struct ToolServerSupervisor {
    config: ProcessConfig,
    status: Arc<Mutex<ChildStatus>>,
    stderr: Arc<StderrTail>,
    drain: Option<JoinHandle<()>>,
    child: Option<Child>,
    watcher: Option<ExitWatcher>,
    spawn_count: u32,
    client: reqwest::Client,
}

impl ToolServerSupervisor {
    pub fn new(config: ProcessConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.poll_interval.max(Duration::from_millis(500)))
            .build()
            .unwrap_or_default();

        Self {
            config,
            status: Arc::new(Mutex::new(ChildStatus::default())),
            stderr: Arc::new(StderrTail::new(MAX_STDERR_BYTES)),
            drain: None,
            child: None,
            watcher: None,
            spawn_count: 0,
            client,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.status.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Base URL of the supervised server.
    pub fn url(&self) -> String {
        self.config.base_url()
    }

    /// OS process id while a child is alive and owned.
    pub fn pid(&self) -> Option<u32> {
        self.status.lock().pid
    }

    /// Exit code of the last child that exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.lock().exit_code
    }

    /// Number of processes spawned by this supervisor.
    pub fn spawn_count(&self) -> u32 {
        self.spawn_count
    }

    /// Most recent stderr output of the child.
    pub fn stderr_tail(&self) -> String {
        self.stderr.snapshot()
    }

    fn set_state(&self, state: SupervisorState) {
        self.status.lock().state = state;
    }

    /// Spawn the tool server and wait until it answers the readiness check.
    ///
    /// Never fails: spawn errors, early exits and readiness timeouts are
    /// logged and leave the supervisor in [`SupervisorState::Crashed`].
    pub async fn start(&mut self) {
        if !self.config.enabled {
            debug!("Local tool server disabled, not starting");
            return;
        }

        let state = self.state();
        if self.child.is_some() || self.watcher.is_some() || !state.can_start() {
            warn!(state = %state, "Tool server supervisor already started");
            return;
        }

        let Some(program) = self.config.command.clone() else {
            warn!("Local tool server enabled but no command configured");
            return;
        };

        self.set_state(SupervisorState::Starting);

        let child = match self.spawn(&program) {
            Ok(child) => child,
            Err(e) => {
                error!(command = %program, error = %e, "Tool server failed to spawn");
                self.set_state(SupervisorState::Crashed);
                return;
            }
        };

        info!(
            command = %program,
            pid = ?child.id(),
            url = %self.config.base_url(),
            "Spawned local tool server"
        );
        self.child = Some(child);

        self.wait_until_ready().await;
    }

    /// Terminate the child: graceful signal first, forced kill after the
    /// stop timeout. The handle is released on every path.
    ///
    /// A child that already crashed keeps the supervisor in `Crashed`.
    pub async fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            self.stop_watched(watcher).await;
            return;
        }

        // Only reachable when start() was abandoned before readiness
        let Some(mut child) = self.child.take() else {
            return;
        };

        self.set_state(SupervisorState::Stopping);
        info!(pid = ?child.id(), "Stopping local tool server");
        shutdown_child(&mut child, self.config.stop_timeout).await;
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
        self.finish_stop();
    }

    async fn stop_watched(&mut self, watcher: ExitWatcher) {
        {
            let mut status = self.status.lock();
            if status.state != SupervisorState::Crashed {
                status.state = SupervisorState::Stopping;
                info!(pid = ?status.pid, "Stopping local tool server");
            }
        }

        // A send error means the watcher already saw the child exit
        let _ = watcher.stop_tx.send(());

        let mut handle = watcher.handle;
        let limit = self.config.stop_timeout * 2 + Duration::from_secs(1);
        if timeout(limit, &mut handle).await.is_err() {
            warn!("Tool server watcher did not finish, aborting it");
            handle.abort();
        }

        self.finish_stop();
    }

    fn finish_stop(&self) {
        let mut status = self.status.lock();
        status.pid = None;
        if status.state != SupervisorState::Crashed {
            status.state = SupervisorState::Stopped;
            info!("Local tool server stopped");
        }
    }

    /// Whether the child has been seen exiting on its own.
    ///
    /// While starting this checks the held child directly. Once ready the
    /// exit watcher records the exit in the background and this reports it.
    pub async fn poll_exit(&mut self) -> bool {
        if self.child.is_some() {
            return self.reap_early_exit().await;
        }
        self.status.lock().exited
    }

    fn spawn(&mut self, program: &str) -> Result<Child, SupervisorError> {
        let mut cmd = Command::new(program);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .env(HOST_ENV_VAR, &self.config.host)
            .env(PORT_ENV_VAR, self.config.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // Reaps the child if the supervisor is dropped without stop()
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::Spawn(e.to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            self.drain = Some(spawn_drain(stderr, Arc::clone(&self.stderr)));
        }
        self.status.lock().pid = child.id();
        self.spawn_count += 1;
        Ok(child)
    }

    async fn wait_until_ready(&mut self) {
        let deadline = Instant::now() + self.config.max_wait;
        let ready_url = self.config.ready_url();

        loop {
            if self.reap_early_exit().await {
                return;
            }

            if self.is_answering(&ready_url).await {
                self.set_state(SupervisorState::Ready);
                info!(url = %self.config.base_url(), "Local tool server is ready");
                self.watch();
                return;
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep(self.config.poll_interval).await;
        }

        error!(
            max_wait_secs = self.config.max_wait.as_secs_f64(),
            url = %ready_url,
            stderr = %self.stderr.snapshot(),
            "Tool server did not become ready in time"
        );
        if let Some(mut child) = self.child.take() {
            shutdown_child(&mut child, self.config.stop_timeout).await;
        }
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }

        let mut status = self.status.lock();
        status.pid = None;
        status.state = SupervisorState::Crashed;
    }

    async fn reap_early_exit(&mut self) -> bool {
        let exit = match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(Some(exit))) => exit,
            Some(Ok(None)) | None => return false,
            Some(Err(e)) => {
                warn!(error = %e, "Failed to query tool server status");
                return false;
            }
        };

        self.child = None;
        finish_drain(self.drain.take()).await;
        record_exit(&self.status, &self.stderr, exit);
        true
    }

    /// Hand the ready child to a background task that reports its exit.
    fn watch(&mut self) {
        let Some(child) = self.child.take() else {
            return;
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(watch_child(
            child,
            stop_rx,
            self.drain.take(),
            Arc::clone(&self.status),
            Arc::clone(&self.stderr),
            self.config.stop_timeout,
        ));
        self.watcher = Some(ExitWatcher { stop_tx, handle });
    }

    async fn is_answering(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            // Any status proves the server is listening; the streaming tool endpoint answers GET with 405
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Readiness check answered");
                true
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Readiness check failed");
                false
            }
        }
    }
}

impl Drop for ToolServerSupervisor {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        // Aborting the watcher drops its child, which kill_on_drop kills
        if let Some(watcher) = self.watcher.take() {
            watcher.handle.abort();
        }
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}

async fn watch_child(
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    drain: Option<JoinHandle<()>>,
    status: Arc<Mutex<ChildStatus>>,
    stderr: Arc<StderrTail>,
    stop_timeout: Duration,
) {
    // None: stop requested, or the supervisor went away
    let waited = tokio::select! {
        waited = child.wait() => Some(waited),
        _ = &mut stop_rx => None,
    };

    match waited {
        Some(Ok(exit)) => {
            finish_drain(drain).await;
            record_exit(&status, &stderr, exit);
        }
        Some(Err(e)) => {
            let e = SupervisorError::Wait(e.to_string());
            error!(error = %e, "Lost track of local tool server");
            shutdown_child(&mut child, stop_timeout).await;
            if let Some(drain) = drain {
                drain.abort();
            }
            let mut status = status.lock();
            status.pid = None;
            status.state = SupervisorState::Crashed;
        }
        None => {
            shutdown_child(&mut child, stop_timeout).await;
            if let Some(drain) = drain {
                drain.abort();
            }
        }
    }
}

fn record_exit(status: &Mutex<ChildStatus>, stderr: &StderrTail, exit: ExitStatus) {
    let was_ready = {
        let mut status = status.lock();
        let was_ready = status.state.is_ready();
        status.state = SupervisorState::Crashed;
        status.pid = None;
        status.exit_code = exit.code();
        status.exited = true;
        was_ready
    };

    error!(
        exit_code = ?exit.code(),
        was_ready,
        stderr = %stderr.snapshot(),
        "Local tool server exited unexpectedly"
    );
}

/// Let the drain pick up the last output of an exited child.
async fn finish_drain(drain: Option<JoinHandle<()>>) {
    let Some(mut drain) = drain else {
        return;
    };
    // Grandchildren can keep the pipe open past the child's exit
    if timeout(STDERR_READ_TIMEOUT, &mut drain).await.is_err() {
        drain.abort();
    }
}

async fn shutdown_child(child: &mut Child, stop_timeout: Duration) {
    if let Err(e) = terminate(child) {
        warn!(error = %e, "Graceful termination failed, killing tool server");
    }

    match timeout(stop_timeout, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(status = %status, "Tool server exited");
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Error waiting for tool server, killing");
            force_kill(child).await;
        }
        Err(_) => {
            warn!(
                timeout_secs = stop_timeout.as_secs_f64(),
                "Tool server did not exit in time, killing"
            );
            force_kill(child).await;
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> Result<(), SupervisorError> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|e| SupervisorError::Signal(e.to_string()))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| SupervisorError::Signal(e.to_string()))
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<(), SupervisorError> {
    child
        .start_kill()
        .map_err(|e| SupervisorError::Signal(e.to_string()))
}

async fn force_kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        let e = SupervisorError::Wait(e.to_string());
        warn!(error = %e, "Forced kill of tool server failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_host_is_reached_through_loopback() {
        let config = ProcessConfig {
            host: "0.0.0.0".to_string(),
            port: 9100,
            ..Default::default()
        };
        assert_eq!(config.base_url(), "http://127.0.0.1:9100");
        assert_eq!(config.ready_url(), "http://127.0.0.1:9100/mcp");
    }

    #[test]
    fn test_ready_path_without_slash() {
        let config = ProcessConfig {
            ready_path: "health".to_string(),
            ..Default::default()
        };
        assert_eq!(config.ready_url(), "http://127.0.0.1:8081/health");
    }

    #[tokio::test]
    async fn test_disabled_start_is_noop() {
        let mut supervisor = ToolServerSupervisor::new(ProcessConfig {
            enabled: false,
            command: Some("sleep".to_string()),
            ..Default::default()
        });
        supervisor.start().await;
        assert_eq!(supervisor.state(), SupervisorState::NotStarted);
        assert_eq!(supervisor.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_enabled_without_command_stays_not_started() {
        let mut supervisor = ToolServerSupervisor::new(ProcessConfig {
            enabled: true,
            command: None,
            ..Default::default()
        });
        supervisor.start().await;
        assert_eq!(supervisor.state(), SupervisorState::NotStarted);
    }

    #[tokio::test]
    async fn test_stop_without_process_is_noop() {
        let mut supervisor = ToolServerSupervisor::new(ProcessConfig::default());
        supervisor.stop().await;
        assert_eq!(supervisor.state(), SupervisorState::NotStarted);
        assert!(supervisor.pid().is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_crashed_not_error() {
        let mut supervisor = ToolServerSupervisor::new(ProcessConfig {
            enabled: true,
            command: Some("/nonexistent/tool-server-binary".to_string()),
            ..Default::default()
        });
        supervisor.start().await;
        assert_eq!(supervisor.state(), SupervisorState::Crashed);
        assert_eq!(supervisor.spawn_count(), 0);
        assert!(supervisor.pid().is_none());
    }
}
