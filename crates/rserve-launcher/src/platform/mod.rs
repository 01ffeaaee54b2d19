//! Platform abstraction layer.
//!
//! Everything that differs between Windows, Linux and the other Unixes is
//! decided here. The rest of the crate asks a [`PlatformFamily`] instead of
//! matching on OS names itself.
//!
//! - `paths` - Private application directories and timestamped names
//! - `process` - Liveness checks and termination

pub mod paths;
pub mod process;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use paths::{app_dir, library_dir, timestamp_name};
pub use process::{is_process_alive, terminate_process_tree};

/// The three platform families the launcher distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    /// `tasklist`, direct execution, interpreter call never returns.
    Windows,
    /// `ps -aux`, `/bin/sh -c`.
    Linux,
    /// macOS and the BSDs: `ps aux`, `/bin/sh -c`.
    OtherUnix,
}

impl PlatformFamily {
    /// Classify an OS name as reported by `std::env::consts::OS`.
    pub fn from_os_name(os: &str) -> Self {
        let os = os.to_lowercase();
        if os.contains("win") && !os.contains("darwin") {
            PlatformFamily::Windows
        } else if os.contains("linux") {
            PlatformFamily::Linux
        } else {
            PlatformFamily::OtherUnix
        }
    }

    /// The family of the running host, detected once.
    pub fn current() -> Self {
        static CURRENT: OnceLock<PlatformFamily> = OnceLock::new();
        *CURRENT.get_or_init(|| Self::from_os_name(std::env::consts::OS))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformFamily::Windows => "windows",
            PlatformFamily::Linux => "linux",
            PlatformFamily::OtherUnix => "unix",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, PlatformFamily::Windows)
    }

    /// Whether an interpreter call returns control so it can be waited on.
    ///
    /// On Windows `R -e` spawned this way never returns; callers sleep instead.
    pub fn waits_for_exit(&self) -> bool {
        !self.is_windows()
    }

    /// Suffix of the package archive R accepts for a local install.
    pub fn archive_suffix(&self) -> &'static str {
        match self {
            PlatformFamily::Windows => ".zip",
            PlatformFamily::Linux => ".tar.gz",
            PlatformFamily::OtherUnix if cfg!(target_os = "macos") => ".tgz",
            PlatformFamily::OtherUnix => ".tar.gz",
        }
    }

    /// The listing tool and its arguments.
    pub fn listing_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            PlatformFamily::Windows => ("tasklist", &[]),
            PlatformFamily::Linux => ("ps", &["-aux"]),
            PlatformFamily::OtherUnix => ("ps", &["aux"]),
        }
    }

    /// Path of the R front end under an R_HOME.
    pub fn interpreter_path(&self, r_home: &Path) -> PathBuf {
        match self {
            PlatformFamily::Windows => r_home.join("bin").join("R.exe"),
            _ => r_home.join("bin").join("R"),
        }
    }

    /// Render a path the way R expects it inside a string literal.
    pub fn r_path(path: &Path) -> String {
        path.to_string_lossy().replace('\\', "/")
    }
}

impl std::fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
