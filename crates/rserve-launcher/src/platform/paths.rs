//! Platform-specific path utilities.
//!
//! The private application directory holds the R package library, one
//! working directory per launch, and the `.Rout` files interpreter output is
//! redirected to.

use crate::config::AppConfig;
use crate::error::{LauncherError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Get the private application directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.local/share/rserve-launcher`
/// - **Windows**: `%LOCALAPPDATA%\rserve-launcher`
/// - **macOS**: `~/Library/Application Support/rserve-launcher`
pub fn app_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .ok_or_else(|| LauncherError::Config {
            message: "Could not determine a data directory".to_string(),
        })?;
    Ok(data_dir.join(AppConfig::APP_DIR_NAME))
}

/// The private R library under an application directory.
pub fn library_dir(app_dir: &Path) -> PathBuf {
    app_dir.join(AppConfig::LIBRARY_DIR_NAME)
}

/// Current local time rendered for directory and file names.
pub fn timestamp_name() -> String {
    chrono::Local::now()
        .format(AppConfig::TIMESTAMP_FORMAT)
        .to_string()
}

/// Path of a fresh `.Rout` redirect file under `app_dir`.
pub fn rout_path(app_dir: &Path) -> PathBuf {
    app_dir.join(format!("{}.{}", timestamp_name(), AppConfig::ROUT_EXTENSION))
}

/// Create `dir` (and parents), reporting rather than propagating failure.
///
/// Returns whether the directory exists afterwards.
pub fn ensure_dir_best_effort(dir: &Path) -> bool {
    if let Err(e) = fs::create_dir_all(dir) {
        warn!("Failed to create {}: {}", dir.display(), e);
    }
    let exists = dir.is_dir();
    if !exists {
        warn!("Directory {} is not available", dir.display());
    }
    exists
}

/// Remove `dir` if it is empty. Errors are ignored.
pub fn remove_dir_if_empty(dir: &Path) {
    let _ = fs::remove_dir(dir);
}
