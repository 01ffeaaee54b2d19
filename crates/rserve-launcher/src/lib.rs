//! rserve-launcher - install, start and supervise a local Rserve daemon.
//!
//! The R interpreter is driven as an opaque subprocess: package installation
//! and daemon startup are both R expressions passed with `-e`. Since the
//! daemon detaches from the interpreter that starts it, readiness is decided
//! by scanning the process table for a new Rserve PID and then probing the
//! port until a connection succeeds.
//!
//! # Example
//!
//! ```rust,no_run
//! use rserve_launcher::Supervisor;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> rserve_launcher::Result<()> {
//!     let supervisor = Supervisor::from_defaults()?;
//!
//!     if supervisor.ensure_running(6311).await {
//!         println!("Rserve is up");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod install;
pub mod locator;
pub mod platform;
pub mod process;
pub mod supervisor;

// Re-export commonly used types
pub use config::{DaemonConfig, InstallTimings, LaunchTimings};
pub use connection::{Connector, DaemonConnection, TcpConnector};
pub use error::{LauncherError, Result};
pub use install::{InstallState, Installer};
pub use locator::{InterpreterLocator, RHomeLocator};
pub use platform::PlatformFamily;
pub use process::{
    CommandRunner, DaemonHandle, DaemonLauncher, ExpressionRunner, LaunchConfig, LaunchState,
    PidSnapshot, PidSource, ProcessEnumerator,
};
pub use supervisor::{Supervisor, SupervisorBuilder};
