//! Daemon launching: spawn, detect the new PID, wait for a connection.
//!
//! Spawning R returns no useful signal (on Windows the call never even
//! returns), and the daemon's listener comes up some time after its process
//! does. Launching therefore polls twice: the process table until a new
//! Rserve PID shows up, then the port until a real connection succeeds.

use super::capture::ChildOutput;
use super::enumerator::PidSource;
use super::runner::ExpressionRunner;
use crate::config::{DaemonConfig, LaunchConfigDefaults, LaunchTimings};
use crate::connection::{self, Connector};
use crate::error::{LauncherError, Result};
use crate::platform::{self, paths, PlatformFamily};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Serializes the spawn + PID-detection phase across all launches in the
/// process. Two launches detecting PIDs at the same time would each see the
/// other's daemon as "new".
fn launch_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// What to start and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Path of the R front end.
    pub interpreter: String,
    /// Arguments for R itself, e.g. `--vanilla`.
    pub interpreter_args: String,
    /// Argument string handed to `Rserve(args=...)`. May carry `--RS-port <N>`.
    pub daemon_args: String,
    /// Start the debug build of the daemon.
    pub debug: bool,
}

impl LaunchConfig {
    pub fn new(
        interpreter: impl Into<String>,
        interpreter_args: impl Into<String>,
        daemon_args: impl Into<String>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            interpreter_args: interpreter_args.into(),
            daemon_args: daemon_args.into(),
            debug: false,
        }
    }

    /// Defaults for an R installation at `r_home`, with the remote control
    /// channel enabled and the daemon bound to `port`.
    pub fn platform_default(family: PlatformFamily, r_home: &Path, port: u16) -> Self {
        Self::new(
            family.interpreter_path(r_home).to_string_lossy(),
            LaunchConfigDefaults::INTERPRETER_ARGS,
            format!(
                "{} {} {}",
                LaunchConfigDefaults::DAEMON_ARGS_PREFIX,
                DaemonConfig::PORT_FLAG,
                port
            ),
        )
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Port the daemon will listen on.
    pub fn port(&self) -> u16 {
        match parse_port(&self.daemon_args) {
            Some(port) => port,
            None => {
                if self.daemon_args.contains(DaemonConfig::PORT_FLAG) {
                    warn!(
                        "Unreadable {} in '{}', probing port {}",
                        DaemonConfig::PORT_FLAG,
                        self.daemon_args,
                        DaemonConfig::DEFAULT_PORT
                    );
                }
                DaemonConfig::DEFAULT_PORT
            }
        }
    }
}

/// The port following `--RS-port` in a daemon argument string.
pub fn parse_port(daemon_args: &str) -> Option<u16> {
    let (_, rest) = daemon_args.split_once(DaemonConfig::PORT_FLAG)?;
    rest.split_whitespace().next()?.parse().ok()
}

/// Steps of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Init,
    PrepWorkdir,
    SnapshotPids,
    Spawning,
    AwaitingNewPid,
    AwaitingConnection,
    Ready,
    Failed,
}

impl std::fmt::Display for LaunchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LaunchState::Init => "init",
            LaunchState::PrepWorkdir => "prep-workdir",
            LaunchState::SnapshotPids => "snapshot-pids",
            LaunchState::Spawning => "spawning",
            LaunchState::AwaitingNewPid => "awaiting-new-pid",
            LaunchState::AwaitingConnection => "awaiting-connection",
            LaunchState::Ready => "ready",
            LaunchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(state: &mut LaunchState, next: LaunchState) {
    debug!("Launch: {} -> {}", state, next);
    *state = next;
}

/// A daemon that accepted a connection. The caller owns its shutdown.
#[derive(Debug)]
pub struct DaemonHandle {
    process: Child,
    /// Drains of the interpreter's pipes; they end with the process.
    output: ChildOutput,
    pid: Option<u32>,
    port: u16,
    working_dir: PathBuf,
}

impl DaemonHandle {
    /// PID of the daemon found in the process table, if a new one appeared.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The interpreter process that started the daemon.
    pub fn process_mut(&mut self) -> &mut Child {
        &mut self.process
    }

    pub fn into_process(self) -> Child {
        self.process
    }

    /// Stop the daemon and the interpreter that started it.
    ///
    /// The working directory is removed if the daemon left it empty.
    pub async fn terminate(mut self, timeout_ms: u64) -> Result<bool> {
        let mut stopped = true;
        if let Some(pid) = self.pid {
            info!("Stopping Rserve (PID {})", pid);
            stopped = tokio::task::spawn_blocking(move || {
                platform::terminate_process_tree(pid, timeout_ms)
            })
            .await
            .map_err(|e| LauncherError::Other(format!("termination task failed: {}", e)))??;
        }

        if let Err(e) = self.process.start_kill() {
            debug!("Interpreter already gone: {}", e);
        }
        if let Err(e) = self.process.wait().await {
            debug!("Failed to reap interpreter: {}", e);
        }
        self.output.abort();

        paths::remove_dir_if_empty(&self.working_dir);
        Ok(stopped)
    }
}

/// Runs the launch state machine.
pub struct DaemonLauncher {
    runner: Arc<dyn ExpressionRunner>,
    pids: Arc<dyn PidSource>,
    connector: Arc<dyn Connector>,
    app_dir: PathBuf,
    library_dir: PathBuf,
    timings: LaunchTimings,
}

impl DaemonLauncher {
    pub fn new(
        runner: Arc<dyn ExpressionRunner>,
        pids: Arc<dyn PidSource>,
        connector: Arc<dyn Connector>,
        app_dir: impl AsRef<Path>,
    ) -> Self {
        let app_dir = app_dir.as_ref().to_path_buf();
        Self {
            runner,
            pids,
            connector,
            library_dir: paths::library_dir(&app_dir),
            app_dir,
            timings: LaunchTimings::default(),
        }
    }

    pub fn with_library_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.library_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_timings(mut self, timings: LaunchTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// R code that loads Rserve from the private library and starts it.
    pub fn startup_expression(&self, config: &LaunchConfig, working_dir: &Path) -> String {
        let lib = PlatformFamily::r_path(&self.library_dir);
        format!(
            "packageDescription('{pkg}',lib.loc='{lib}'); \
             library({pkg},lib.loc='{lib}'); \
             setwd('{wd}'); \
             print(getwd()); \
             {pkg}({debug},args='{args}');{fixes}",
            pkg = DaemonConfig::PACKAGE_NAME,
            lib = lib,
            wd = PlatformFamily::r_path(working_dir),
            debug = if config.debug { "TRUE" } else { "FALSE" },
            args = config.daemon_args,
            fixes = DaemonConfig::STARTUP_FIXES,
        )
    }

    /// Start a daemon and wait until it accepts connections.
    ///
    /// Returns `None` if the interpreter could not be spawned or no connection
    /// succeeded within the budget.
    pub async fn launch(&self, config: &LaunchConfig) -> Option<DaemonHandle> {
        let mut state = LaunchState::Init;
        info!(
            "Waiting for Rserve to start ... ({} {})",
            config.interpreter, config.interpreter_args
        );

        enter(&mut state, LaunchState::PrepWorkdir);
        let working_dir = self.prepare_working_dir();

        enter(&mut state, LaunchState::SnapshotPids);
        let baseline = self.pids.list_daemon_pids().await;
        let baseline_pid = baseline.newest();
        debug!("PIDs before launch: {:?}", baseline.pids());

        let (process, output, pid) = {
            let _guard = launch_lock().lock().await;

            enter(&mut state, LaunchState::Spawning);
            let expression = self.startup_expression(config, &working_dir);
            let Some(mut process) = self.runner.run(
                &expression,
                &config.interpreter,
                &config.interpreter_args,
                true,
            ) else {
                error!("Failed to start Rserve process.");
                enter(&mut state, LaunchState::Failed);
                paths::remove_dir_if_empty(&working_dir);
                return None;
            };
            info!("Rserve startup done, waiting for its process");
            let output = ChildOutput::capture(&mut process, false);

            enter(&mut state, LaunchState::AwaitingNewPid);
            let pid = self.await_new_pid(baseline_pid).await;
            (process, output, pid)
        };

        enter(&mut state, LaunchState::AwaitingConnection);
        let port = config.port();
        if self.await_connection(port).await {
            info!(
                "Rserve is running (PID {})",
                pid.map_or_else(|| "unknown".to_string(), |p| p.to_string())
            );
            enter(&mut state, LaunchState::Ready);
            return Some(DaemonHandle {
                process,
                output,
                pid,
                port,
                working_dir,
            });
        }

        error!(
            "Rserve did not accept connections on port {} after {} attempts",
            port, self.timings.connect_attempts
        );
        enter(&mut state, LaunchState::Failed);
        paths::remove_dir_if_empty(&working_dir);
        None
    }

    /// Create `<app_dir>/<timestamp>`. Failure is logged, never fatal.
    fn prepare_working_dir(&self) -> PathBuf {
        match fs::read_dir(&self.library_dir) {
            Ok(entries) => {
                let names: Vec<_> = entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect();
                debug!(
                    "From lib directory {}, which contains: {:?}",
                    self.library_dir.display(),
                    names
                );
            }
            Err(e) => debug!(
                "Library directory {} unreadable: {}",
                self.library_dir.display(),
                e
            ),
        }

        let working_dir = self.app_dir.join(paths::timestamp_name());
        info!("In working directory: {}", working_dir.display());
        if !paths::ensure_dir_best_effort(&working_dir) {
            error!("Working directory {} not available", working_dir.display());
        }
        working_dir
    }

    /// Poll the process table until its newest PID differs from `baseline`.
    ///
    /// Running out of attempts is not fatal: the daemon may still come up.
    async fn await_new_pid(&self, baseline: Option<u32>) -> Option<u32> {
        for attempt in 1..=self.timings.pid_poll_attempts {
            let snapshot = self.pids.list_daemon_pids().await;
            if let Some(pid) = snapshot.new_since(baseline) {
                debug!("New Rserve PID {} after {} polls", pid, attempt);
                return Some(pid);
            }
            tokio::time::sleep(self.timings.pid_poll_interval).await;
        }
        warn!(
            "No new Rserve process after {} polls, trying to connect anyway",
            self.timings.pid_poll_attempts
        );
        None
    }

    /// Probe `port` once per delay until a connection succeeds.
    async fn await_connection(&self, port: u16) -> bool {
        for attempt in 1..=self.timings.connect_attempts {
            tokio::time::sleep(self.timings.connect_delay).await;
            if connection::probe(self.connector.as_ref(), DaemonConfig::DEFAULT_HOST, port).await
            {
                debug!("Connected on attempt {}", attempt);
                return true;
            }
        }
        false
    }
}
