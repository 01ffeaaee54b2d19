//! Set-and-forget entry point.
//!
//! [`Supervisor::ensure_running`] is the call most users want: it returns at
//! once when a daemon already answers on the port, and otherwise finds R and
//! runs the full launch.

mod builder;

pub use builder::SupervisorBuilder;

use crate::config::DaemonConfig;
use crate::connection::{self, Connector};
use crate::error::{LauncherError, Result};
use crate::install::Installer;
use crate::locator::InterpreterLocator;
use crate::platform::{self, PlatformFamily};
use crate::process::{DaemonHandle, DaemonLauncher, LaunchConfig, PidSnapshot, PidSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Owns the launcher, the installer and the collaborators they share.
pub struct Supervisor {
    family: PlatformFamily,
    launcher: DaemonLauncher,
    installer: Installer,
    pids: Arc<dyn PidSource>,
    connector: Arc<dyn Connector>,
    locator: Arc<dyn InterpreterLocator>,
}

impl Supervisor {
    pub fn builder(app_dir: impl Into<PathBuf>) -> SupervisorBuilder {
        SupervisorBuilder::new(app_dir)
    }

    /// Supervisor for the running host, rooted at the per-user data directory.
    pub fn from_defaults() -> Result<Self> {
        Self::builder(platform::app_dir()?).build()
    }

    pub fn family(&self) -> PlatformFamily {
        self.family
    }

    pub fn launcher(&self) -> &DaemonLauncher {
        &self.launcher
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    /// Whether a daemon accepts connections on `port` right now.
    pub async fn is_running(&self, port: u16) -> bool {
        connection::probe(self.connector.as_ref(), DaemonConfig::DEFAULT_HOST, port).await
    }

    /// Rserve PIDs currently in the process table.
    pub async fn daemon_pids(&self) -> PidSnapshot {
        self.pids.list_daemon_pids().await
    }

    /// The R installation the daemon will be started from.
    pub async fn r_home(&self) -> Result<PathBuf> {
        self.locator
            .locate_r_home()
            .await
            .ok_or(LauncherError::InterpreterNotFound)
    }

    /// Start a daemon on `port` without checking whether one already runs.
    pub async fn launch(&self, port: u16) -> Option<DaemonHandle> {
        let r_home = match self.r_home().await {
            Ok(home) => home,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        let config = LaunchConfig::platform_default(self.family, &r_home, port);
        self.launcher.launch(&config).await
    }

    /// Make sure a daemon answers on `port`, launching one if needed.
    pub async fn ensure_running(&self, port: u16) -> bool {
        if self.is_running(port).await {
            info!("Rserve already reachable on port {}", port);
            return true;
        }
        self.launch(port).await.is_some()
    }

    /// Install Rserve into the private library unless it is already there.
    pub async fn install(&self, proxy: Option<&str>, repository: Option<&str>) -> Result<bool> {
        let r_home = self.r_home().await?;
        let interpreter = self.family.interpreter_path(&r_home);
        Ok(self
            .installer
            .install(&interpreter.to_string_lossy(), proxy, repository)
            .await)
    }

    /// Install when missing, then [`ensure_running`](Self::ensure_running).
    pub async fn provision(&self, port: u16, proxy: Option<&str>, repository: Option<&str>) -> bool {
        if self.is_running(port).await {
            info!("Rserve already reachable on port {}", port);
            return true;
        }
        match self.install(proxy, repository).await {
            Ok(true) => self.ensure_running(port).await,
            Ok(false) => {
                error!("Rserve could not be installed");
                false
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }
}
