//! R installation discovery.

use crate::platform::PlatformFamily;
use crate::process::{RegistryCapture, StreamCapture};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Registry keys R's Windows installer writes `InstallPath` under.
const REGISTRY_KEYS: [&str; 2] = [r"HKLM\SOFTWARE\R-core\R", r"HKCU\SOFTWARE\R-core\R"];

/// Finds the R_HOME of a usable R installation.
#[async_trait]
pub trait InterpreterLocator: Send + Sync {
    async fn locate_r_home(&self) -> Option<PathBuf>;
}

/// Looks in `R_HOME`, then asks the system, then tries well-known roots.
///
/// A candidate only counts if its `bin/R` (or `bin\R.exe`) exists.
#[derive(Debug, Clone)]
pub struct RHomeLocator {
    family: PlatformFamily,
    hint: Option<PathBuf>,
    search_roots: Vec<PathBuf>,
    query_system: bool,
}

impl RHomeLocator {
    /// Locator for `family`, seeded from the `R_HOME` environment variable.
    pub fn new(family: PlatformFamily) -> Self {
        Self {
            family,
            hint: std::env::var_os("R_HOME").map(PathBuf::from),
            search_roots: default_search_roots(family),
            query_system: true,
        }
    }

    pub fn current() -> Self {
        Self::new(PlatformFamily::current())
    }

    /// Replace the `R_HOME` hint.
    pub fn with_hint(mut self, hint: Option<PathBuf>) -> Self {
        self.hint = hint;
        self
    }

    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    /// Enable or disable `reg query` / `R RHOME`.
    pub fn with_system_queries(mut self, enabled: bool) -> Self {
        self.query_system = enabled;
        self
    }

    fn accept(&self, candidate: &Path) -> bool {
        let ok = self.family.interpreter_path(candidate).is_file();
        if !ok {
            debug!("No R interpreter under {}", candidate.display());
        }
        ok
    }

    async fn query_registry(&self) -> Option<PathBuf> {
        for key in REGISTRY_KEYS {
            let mut child = match Command::new("reg")
                .args(["query", key, "/v", "InstallPath"])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
            {
                Ok(child) => child,
                Err(e) => {
                    warn!("Failed to run reg query: {}", e);
                    return None;
                }
            };

            let install_path = child
                .stdout
                .take()
                .map(|stdout| RegistryCapture::spawn(stdout, true));
            let errors = child
                .stderr
                .take()
                .map(|stderr| StreamCapture::spawn(stderr, false));

            let found = match install_path {
                Some(capture) => capture.finish().await,
                None => None,
            };
            if let Some(capture) = errors {
                capture.finish().await;
            }
            if let Err(e) = child.wait().await {
                debug!("Failed to wait for reg query: {}", e);
            }

            if let Some(path) = found {
                debug!("Registry {} reports InstallPath {}", key, path);
                return Some(PathBuf::from(path));
            }
        }
        None
    }

    async fn query_r_rhome(&self) -> Option<PathBuf> {
        let output = match Command::new("R")
            .arg("RHOME")
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!("R RHOME exited with {}", output.status);
                return None;
            }
            Err(e) => {
                debug!("R is not on the PATH: {}", e);
                return None;
            }
        };
        let home = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!home.is_empty()).then(|| PathBuf::from(home))
    }

    fn search_well_known(&self) -> Option<PathBuf> {
        for root in &self.search_roots {
            if self.accept(root) {
                return Some(root.clone());
            }
            // `C:\Program Files\R` holds one `R-x.y.z` directory per version.
            if let Some(newest) = newest_versioned_child(root) {
                if self.accept(&newest) {
                    return Some(newest);
                }
            }
        }
        None
    }
}

impl Default for RHomeLocator {
    fn default() -> Self {
        Self::current()
    }
}

#[async_trait]
impl InterpreterLocator for RHomeLocator {
    async fn locate_r_home(&self) -> Option<PathBuf> {
        if let Some(hint) = self.hint.as_ref().filter(|hint| self.accept(hint)) {
            info!("Using R_HOME {}", hint.display());
            return Some(hint.clone());
        }

        if self.query_system {
            let reported = if self.family.is_windows() {
                self.query_registry().await
            } else {
                self.query_r_rhome().await
            };
            if let Some(home) = reported.filter(|home| self.accept(home)) {
                info!("Found R_HOME {}", home.display());
                return Some(home);
            }
        }

        let found = self.search_well_known();
        match &found {
            Some(home) => info!("Found R_HOME {}", home.display()),
            None => warn!("No R installation found"),
        }
        found
    }
}

fn default_search_roots(family: PlatformFamily) -> Vec<PathBuf> {
    let roots: &[&str] = match family {
        PlatformFamily::Windows => &[r"C:\Program Files\R", r"C:\Program Files (x86)\R"],
        PlatformFamily::Linux => &[
            "/usr/lib/R",
            "/usr/lib64/R",
            "/usr/local/lib/R",
            "/usr/local/lib64/R",
            "/opt/R",
        ],
        PlatformFamily::OtherUnix => &[
            "/Library/Frameworks/R.framework/Resources",
            "/usr/local/lib/R",
            "/opt/local/lib/R",
        ],
    };
    roots.iter().map(PathBuf::from).collect()
}

/// The lexically greatest `R-*` directory under `root`.
fn newest_versioned_child(root: &Path) -> Option<PathBuf> {
    fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("R-"))
        })
        .max()
}
