//! Process management for the Rserve daemon.
//!
//! Handles running the R interpreter, draining its output, finding daemon
//! processes, and the launch state machine built on top of them.
//!
//! # Detection Strategy
//!
//! Rserve forks away from the interpreter that starts it, so the spawned
//! child's PID is not the daemon's. Launch detection combines:
//! 1. **Process table scan** - the newest Rserve PID after spawning
//! 2. **Connection probe** - the only reliable "ready" signal
//!
//! # Example
//!
//! ```rust,no_run
//! use rserve_launcher::process::{PidSource, ProcessEnumerator};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let snapshot = ProcessEnumerator::current().list_daemon_pids().await;
//!     for pid in snapshot.pids() {
//!         println!("Rserve PID: {}", pid);
//!     }
//! }
//! ```

mod capture;
mod enumerator;
mod launcher;
mod runner;

pub use capture::{parse_install_path, ChildOutput, RegistryCapture, StreamCapture};
pub use enumerator::{parse_listing, PidSnapshot, PidSource, ProcessEnumerator};
pub use launcher::{parse_port, DaemonHandle, DaemonLauncher, LaunchConfig, LaunchState};
pub use runner::{build_command_line, CommandRunner, ExpressionRunner};
