//! Error types for rserve-launcher.
//!
//! Leaf components (enumerator, command runner, output capture) never let these
//! escape: they log them and hand back a sentinel. The variants still exist so
//! the internal helpers can use `?` and carry context into the log line.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the launcher library.
#[derive(Debug, Error)]
pub enum LauncherError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Subprocess errors
    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process listing via `{tool}` failed: {message}")]
    EnumerationFailed { tool: String, message: String },

    // Daemon connection errors
    #[error("Connection to {host}:{port} failed: {message}")]
    Connection {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // Environment errors
    #[error("R installation not found")]
    InterpreterNotFound,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for launcher operations.
pub type Result<T> = std::result::Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(err: std::io::Error) -> Self {
        LauncherError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl LauncherError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LauncherError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error is worth another attempt after a delay.
    ///
    /// Readiness probes fail with these while the daemon is still starting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LauncherError::Connection { .. } | LauncherError::Timeout(_)
        )
    }
}
