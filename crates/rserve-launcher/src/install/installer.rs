//! Installs the Rserve package with the interpreter's own `install.packages`.

use crate::config::{DaemonConfig, InstallConfig, InstallTimings};
use crate::error::{LauncherError, Result};
use crate::platform::{paths, PlatformFamily};
use crate::process::ExpressionRunner;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// Installer progress, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotChecked,
    CheckingInstalled,
    Installing,
    PollingInstalled,
    Installed,
    InstallFailed,
}

impl std::fmt::Display for InstallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InstallState::NotChecked => "not-checked",
            InstallState::CheckingInstalled => "checking-installed",
            InstallState::Installing => "installing",
            InstallState::PollingInstalled => "polling-installed",
            InstallState::Installed => "installed",
            InstallState::InstallFailed => "install-failed",
        };
        f.write_str(name)
    }
}

/// Answer of the `installed.packages` membership test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Installed,
    NotInstalled,
    /// Output matched neither marker.
    Indeterminate,
}

impl Membership {
    pub fn is_installed(&self) -> bool {
        matches!(self, Membership::Installed)
    }
}

/// Classification of `install.packages` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Succeeded,
    Failed,
    Indeterminate,
}

/// Classify the text printed by the membership expression.
pub fn classify_membership(output: &str) -> Membership {
    if output.contains(InstallConfig::INSTALLED_MARKER) {
        Membership::Installed
    } else if output.contains(InstallConfig::NOT_INSTALLED_MARKER) {
        Membership::NotInstalled
    } else {
        Membership::Indeterminate
    }
}

/// Classify the text printed by `install.packages`.
pub fn classify_install_output(output: &str) -> InstallOutcome {
    if InstallConfig::SUCCESS_MARKERS
        .iter()
        .any(|marker| output.contains(marker))
    {
        InstallOutcome::Succeeded
    } else if InstallConfig::FAILURE_MARKERS
        .iter()
        .any(|marker| output.contains(marker))
    {
        InstallOutcome::Failed
    } else {
        InstallOutcome::Indeterminate
    }
}

/// Ensures Rserve is present in the private library.
pub struct Installer {
    runner: Arc<dyn ExpressionRunner>,
    library_dir: PathBuf,
    resources_dir: Option<PathBuf>,
    timings: InstallTimings,
}

impl Installer {
    pub fn new(runner: Arc<dyn ExpressionRunner>, library_dir: impl AsRef<Path>) -> Self {
        Self {
            runner,
            library_dir: library_dir.as_ref().to_path_buf(),
            resources_dir: None,
            timings: InstallTimings::default(),
        }
    }

    /// Directory that may contain a bundled `Rserve_1.7-5` archive.
    pub fn with_resources_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.resources_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_timings(mut self, timings: InstallTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    fn family(&self) -> PlatformFamily {
        self.runner.family()
    }

    fn lib(&self) -> String {
        PlatformFamily::r_path(&self.library_dir)
    }

    pub fn membership_expression(&self) -> String {
        format!(
            "is.element(set=installed.packages(lib.loc='{}'),el='{}')",
            self.lib(),
            DaemonConfig::PACKAGE_NAME
        )
    }

    pub fn repository_expression(&self, proxy: Option<&str>, repository: &str) -> String {
        let mut expression = String::new();
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            expression.push_str(&format!("Sys.setenv(http_proxy='{}');", proxy));
        }
        expression.push_str(&format!(
            "install.packages('{}',repos='{}',lib='{}')",
            DaemonConfig::PACKAGE_NAME,
            repository,
            self.lib()
        ));
        expression
    }

    pub fn archive_expression(&self, archive: &Path) -> String {
        format!(
            "install.packages('{}',repos=NULL,lib='{}')",
            PlatformFamily::r_path(archive),
            self.lib()
        )
    }

    /// Whether the package directory already exists in the library.
    pub fn is_package_present(&self) -> bool {
        self.library_dir.join(DaemonConfig::PACKAGE_NAME).is_dir()
    }

    /// Ask the interpreter whether Rserve is in the private library.
    pub async fn is_installed(&self, interpreter: &str) -> bool {
        self.check_membership(interpreter).await.is_installed()
    }

    async fn check_membership(&self, interpreter: &str) -> Membership {
        let Some(output) = self
            .runner
            .run_captured(
                &self.membership_expression(),
                interpreter,
                InstallConfig::INTERPRETER_ARGS,
                self.timings.detached_settle_delay,
            )
            .await
        else {
            error!("Failed to ask if Rserve is installed");
            return Membership::Indeterminate;
        };

        let membership = classify_membership(&output);
        match membership {
            Membership::Installed => info!("Rserve is already installed."),
            Membership::NotInstalled => info!("Rserve is not yet installed."),
            Membership::Indeterminate => {
                error!("Cannot check if Rserve is installed: {}", output.trim())
            }
        }
        membership
    }

    /// Install Rserve unless it is already there.
    ///
    /// Prefers the bundled archive when one exists in the resources directory,
    /// otherwise installs from `repository` (default CRAN cloud mirror),
    /// optionally through `proxy`. The install output is only logged: the
    /// result is decided by polling the membership test afterwards.
    pub async fn install(
        &self,
        interpreter: &str,
        proxy: Option<&str>,
        repository: Option<&str>,
    ) -> bool {
        let mut state = InstallState::NotChecked;
        transition(&mut state, InstallState::CheckingInstalled);

        if self.is_package_present() {
            info!(
                "Already installed Rserve (in {})",
                self.library_dir.display()
            );
            transition(&mut state, InstallState::Installed);
            return true;
        }

        transition(&mut state, InstallState::Installing);
        paths::ensure_dir_best_effort(&self.library_dir);

        let outcome = match self.bundled_archive() {
            Some(archive) => self.install_from_archive(interpreter, &archive).await,
            None => {
                let repository = repository
                    .filter(|r| !r.is_empty())
                    .unwrap_or(InstallConfig::DEFAULT_REPOSITORY);
                self.install_from_repository(interpreter, proxy, repository)
                    .await
            }
        };

        let Some(outcome) = outcome else {
            transition(&mut state, InstallState::InstallFailed);
            return false;
        };
        debug!("Install output classified as {:?}", outcome);

        transition(&mut state, InstallState::PollingInstalled);
        if self.poll_installed(interpreter).await {
            transition(&mut state, InstallState::Installed);
            true
        } else {
            transition(&mut state, InstallState::InstallFailed);
            false
        }
    }

    /// Location of the bundled archive for this platform, if shipped.
    fn bundled_archive(&self) -> Option<PathBuf> {
        let dir = self.resources_dir.as_ref()?;
        let archive = dir.join(format!(
            "{}{}",
            InstallConfig::BUNDLED_ARCHIVE_STEM,
            self.family().archive_suffix()
        ));
        archive.is_file().then_some(archive)
    }

    /// Copy the bundled archive to a temp file carrying the platform suffix.
    fn extract_archive(&self, archive: &Path) -> Result<NamedTempFile> {
        let mut temp = tempfile::Builder::new()
            .prefix(InstallConfig::BUNDLED_ARCHIVE_STEM)
            .suffix(self.family().archive_suffix())
            .tempfile()?;
        let mut source =
            fs::File::open(archive).map_err(|e| LauncherError::io_with_path(e, archive))?;
        std::io::copy(&mut source, temp.as_file_mut())
            .map_err(|e| LauncherError::io_with_path(e, temp.path()))?;
        if !temp.path().is_file() {
            return Err(LauncherError::Other(format!(
                "Could not create file {}",
                temp.path().display()
            )));
        }
        Ok(temp)
    }

    async fn install_from_archive(
        &self,
        interpreter: &str,
        archive: &Path,
    ) -> Option<InstallOutcome> {
        info!(
            "Install Rserve from local filesystem... (in {})",
            self.library_dir.display()
        );
        // Held until the install command finished; removed on drop.
        let temp = match self.extract_archive(archive) {
            Ok(temp) => temp,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        self.run_install(interpreter, &self.archive_expression(temp.path()))
            .await
    }

    async fn install_from_repository(
        &self,
        interpreter: &str,
        proxy: Option<&str>,
        repository: &str,
    ) -> Option<InstallOutcome> {
        info!(
            "Install Rserve from {} ... (http_proxy='{}')",
            repository,
            proxy.unwrap_or("")
        );
        self.run_install(interpreter, &self.repository_expression(proxy, repository))
            .await
    }

    async fn run_install(&self, interpreter: &str, expression: &str) -> Option<InstallOutcome> {
        let Some(output) = self
            .runner
            .run_captured(
                expression,
                interpreter,
                InstallConfig::INTERPRETER_ARGS,
                self.timings.detached_settle_delay,
            )
            .await
        else {
            error!("Failed to launch Rserve install");
            return None;
        };

        let outcome = classify_install_output(&output);
        let pretty = output.replace('\n', "\n  | ");
        match outcome {
            InstallOutcome::Succeeded => info!("Rserve install succeeded: {}", pretty),
            InstallOutcome::Failed => warn!("Rserve install failed: {}", pretty),
            InstallOutcome::Indeterminate => error!("Rserve install unknown: {}", pretty),
        }
        Some(outcome)
    }

    /// Re-run the membership test until it succeeds or the budget runs out.
    async fn poll_installed(&self, interpreter: &str) -> bool {
        for attempt in 1..=self.timings.poll_attempts {
            tokio::time::sleep(self.timings.poll_delay).await;
            if self.is_installed(interpreter).await {
                info!("Rserve is installed (check {})", attempt);
                return true;
            }
            debug!(
                "Rserve not installed yet ({}/{})",
                attempt, self.timings.poll_attempts
            );
        }
        warn!("Rserve is not installed");
        false
    }
}

fn transition(state: &mut InstallState, next: InstallState) {
    debug!("Installer: {} -> {}", state, next);
    *state = next;
}
