//! Builder for wiring a [`Supervisor`] together.

use super::Supervisor;
use crate::config::{InstallTimings, LaunchTimings};
use crate::connection::{Connector, TcpConnector};
use crate::error::{LauncherError, Result};
use crate::install::Installer;
use crate::locator::{InterpreterLocator, RHomeLocator};
use crate::platform::{paths, PlatformFamily};
use crate::process::{CommandRunner, DaemonLauncher, ExpressionRunner, PidSource, ProcessEnumerator};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for configuring a [`Supervisor`].
///
/// Every collaborator defaults to the real implementation for the running
/// host and can be swapped out.
///
/// # Example
///
/// ```rust,no_run
/// use rserve_launcher::Supervisor;
///
/// # fn main() -> rserve_launcher::Result<()> {
/// let supervisor = Supervisor::builder("/tmp/rserve-launcher")
///     .auto_create_dirs(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SupervisorBuilder {
    app_dir: PathBuf,
    library_dir: Option<PathBuf>,
    resources_dir: Option<PathBuf>,
    auto_create_dirs: bool,
    family: PlatformFamily,
    runner: Option<Arc<dyn ExpressionRunner>>,
    pids: Option<Arc<dyn PidSource>>,
    connector: Option<Arc<dyn Connector>>,
    locator: Option<Arc<dyn InterpreterLocator>>,
    launch_timings: LaunchTimings,
    install_timings: InstallTimings,
}

impl SupervisorBuilder {
    /// Create a new builder rooted at the private application directory.
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
            library_dir: None,
            resources_dir: None,
            auto_create_dirs: false,
            family: PlatformFamily::current(),
            runner: None,
            pids: None,
            connector: None,
            locator: None,
            launch_timings: LaunchTimings::default(),
            install_timings: InstallTimings::default(),
        }
    }

    /// Create the application directory if it doesn't exist.
    ///
    /// Default: `false` (the launch creates what it needs on demand)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Use a library directory other than `<app_dir>/library`.
    pub fn library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = Some(dir.into());
        self
    }

    /// Directory searched for a bundled Rserve archive.
    pub fn resources_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resources_dir = Some(dir.into());
        self
    }

    pub fn family(mut self, family: PlatformFamily) -> Self {
        self.family = family;
        self
    }

    pub fn runner(mut self, runner: Arc<dyn ExpressionRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn pid_source(mut self, pids: Arc<dyn PidSource>) -> Self {
        self.pids = Some(pids);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn locator(mut self, locator: Arc<dyn InterpreterLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn launch_timings(mut self, timings: LaunchTimings) -> Self {
        self.launch_timings = timings;
        self
    }

    pub fn install_timings(mut self, timings: InstallTimings) -> Self {
        self.install_timings = timings;
        self
    }

    /// Build the Supervisor instance.
    pub fn build(self) -> Result<Supervisor> {
        if self.auto_create_dirs && !self.app_dir.exists() {
            fs::create_dir_all(&self.app_dir).map_err(|e| LauncherError::Io {
                message: format!("Failed to create app directory: {}", self.app_dir.display()),
                path: Some(self.app_dir.clone()),
                source: Some(e),
            })?;
        }

        let family = self.family;
        let library_dir = self
            .library_dir
            .unwrap_or_else(|| paths::library_dir(&self.app_dir));

        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(CommandRunner::new(family, &self.app_dir)));
        let pids = self
            .pids
            .unwrap_or_else(|| Arc::new(ProcessEnumerator::new(family)));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TcpConnector::default()));
        let locator = self
            .locator
            .unwrap_or_else(|| Arc::new(RHomeLocator::new(family)));

        let launcher = DaemonLauncher::new(runner.clone(), pids.clone(), connector.clone(), &self.app_dir)
            .with_library_dir(&library_dir)
            .with_timings(self.launch_timings);

        let mut installer = Installer::new(runner, &library_dir).with_timings(self.install_timings);
        if let Some(resources) = &self.resources_dir {
            installer = installer.with_resources_dir(resources);
        }

        Ok(Supervisor {
            family,
            launcher,
            installer,
            pids,
            connector,
            locator,
        })
    }
}
