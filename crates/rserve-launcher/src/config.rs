//! Centralized configuration for rserve-launcher.
//!
//! Fixed names and markers live in associated-const structs; polling budgets
//! live in plain structs with `Default` impls so callers (and tests) can
//! shorten them.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "rserve-launcher";
    /// Directory name under the platform data dir.
    pub const APP_DIR_NAME: &'static str = "rserve-launcher";
    /// Subdirectory of the app dir used as the private R library.
    pub const LIBRARY_DIR_NAME: &'static str = "library";
    /// chrono format for working directory and `.Rout` names.
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d_%H-%M-%S";
    pub const ROUT_EXTENSION: &'static str = "Rout";
}

/// Facts about the Rserve daemon and its package.
pub struct DaemonConfig;

impl DaemonConfig {
    pub const PACKAGE_NAME: &'static str = "Rserve";
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 6311;
    pub const PORT_FLAG: &'static str = "--RS-port";
    /// Executable names as they appear in `tasklist`.
    pub const WINDOWS_IMAGE_NAMES: [&'static str; 2] = ["Rserve.exe", "Rserve_d.exe"];
    /// Command-line fragments as they appear in `ps` output.
    pub const UNIX_CMDLINE_MARKERS: [&'static str; 2] = ["Rserve --vanilla", "Rserve_d --vanilla"];
    /// Process state prefix of a session leader (`Ss`, `Ss+`, `Ssl`...).
    pub const UNIX_STATE_PREFIX: &'static str = "Ss";
    /// Length of the identification block Rserve sends on connect.
    pub const GREETING_LEN: usize = 32;
    pub const GREETING_MAGIC: &'static [u8] = b"Rsrv";
    /// Appended to the startup expression so a daemon-side error does not
    /// drop the interpreter into an interactive prompt.
    pub const STARTUP_FIXES: &'static str =
        "flush.console <- function(...) {return;}; options(error=function() NULL)";
}

/// Package installation configuration.
pub struct InstallConfig;

impl InstallConfig {
    pub const DEFAULT_REPOSITORY: &'static str = "https://cloud.r-project.org";
    pub const INTERPRETER_ARGS: &'static str = "--vanilla --silent";
    /// File stem of the archive that may ship in the resources directory.
    pub const BUNDLED_ARCHIVE_STEM: &'static str = "Rserve_1.7-5";

    pub const INSTALLED_MARKER: &'static str = "[1] TRUE";
    pub const NOT_INSTALLED_MARKER: &'static str = "[1] FALSE";
    pub const SUCCESS_MARKERS: [&'static str; 2] = [
        "package 'Rserve' successfully unpacked and MD5 sums checked",
        "* DONE (Rserve)",
    ];
    pub const FAILURE_MARKERS: [&'static str; 2] = ["FAILED", "Error"];
}

/// Defaults used by the supervisor entry point when it launches on its own.
pub struct LaunchConfigDefaults;

impl LaunchConfigDefaults {
    pub const INTERPRETER_ARGS: &'static str = "--vanilla";
    pub const DAEMON_ARGS_PREFIX: &'static str = "--vanilla --RS-enable-control";
}

/// Polling budgets for the launch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchTimings {
    /// Delay between process-table polls while waiting for a new PID.
    pub pid_poll_interval: Duration,
    pub pid_poll_attempts: u32,
    /// Delay before each readiness probe.
    pub connect_delay: Duration,
    pub connect_attempts: u32,
}

impl Default for LaunchTimings {
    fn default() -> Self {
        Self {
            pid_poll_interval: Duration::from_millis(100),
            pid_poll_attempts: 50,
            connect_delay: Duration::from_secs(1),
            connect_attempts: 30,
        }
    }
}

/// Timing for interpreter invocations made by the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallTimings {
    /// How long to wait on platforms where the interpreter call never returns.
    pub detached_settle_delay: Duration,
    /// Delay before each post-install membership check.
    pub poll_delay: Duration,
    pub poll_attempts: u32,
}

impl Default for InstallTimings {
    fn default() -> Self {
        Self {
            detached_settle_delay: Duration::from_secs(2),
            poll_delay: Duration::from_secs(2),
            poll_attempts: 5,
        }
    }
}

/// Timeout for a single readiness probe connection.
pub const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
