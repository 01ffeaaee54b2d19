//! Rserve process discovery via the platform's process-listing tool.
//!
//! There is no PID file: the daemon is forked by R itself, so the only way to
//! learn its PID is to list processes and pick out the Rserve lines.

use crate::config::DaemonConfig;
use crate::error::{LauncherError, Result};
use crate::platform::PlatformFamily;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// PIDs of the running Rserve processes, in the listing tool's order.
///
/// The order is treated as oldest-first; [`PidSnapshot::newest`] is the last
/// entry. Nothing guarantees the tool keeps a stable append order between two
/// calls, and duplicates are not removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PidSnapshot(Vec<u32>);

impl PidSnapshot {
    pub fn new(pids: Vec<u32>) -> Self {
        Self(pids)
    }

    pub fn pids(&self) -> &[u32] {
        &self.0
    }

    pub fn newest(&self) -> Option<u32> {
        self.0.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The newest PID, if it differs from the newest PID of `baseline`.
    pub fn new_since(&self, baseline: Option<u32>) -> Option<u32> {
        match self.newest() {
            Some(pid) if Some(pid) != baseline => Some(pid),
            _ => None,
        }
    }
}

impl From<Vec<u32>> for PidSnapshot {
    fn from(pids: Vec<u32>) -> Self {
        Self(pids)
    }
}

/// Source of PID snapshots.
#[async_trait]
pub trait PidSource: Send + Sync {
    /// List running daemon PIDs. Never fails: problems yield an empty snapshot.
    async fn list_daemon_pids(&self) -> PidSnapshot;
}

/// Lists Rserve processes with `tasklist` or `ps`.
#[derive(Debug, Clone, Copy)]
pub struct ProcessEnumerator {
    family: PlatformFamily,
}

impl ProcessEnumerator {
    pub fn new(family: PlatformFamily) -> Self {
        Self { family }
    }

    /// Enumerator for the running host.
    pub fn current() -> Self {
        Self::new(PlatformFamily::current())
    }

    pub fn family(&self) -> PlatformFamily {
        self.family
    }

    async fn run_listing(&self) -> Result<String> {
        let (tool, args) = self.family.listing_command();
        let output = Command::new(tool)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LauncherError::EnumerationFailed {
                tool: tool.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(LauncherError::EnumerationFailed {
                tool: tool.to_string(),
                message: format!("exited with {}", output.status),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for ProcessEnumerator {
    fn default() -> Self {
        Self::current()
    }
}

#[async_trait]
impl PidSource for ProcessEnumerator {
    async fn list_daemon_pids(&self) -> PidSnapshot {
        match self.run_listing().await {
            Ok(listing) => {
                let snapshot = parse_listing(self.family, &listing);
                debug!("Found Rserve PIDs {:?}", snapshot.pids());
                snapshot
            }
            Err(e) => {
                warn!("{}", e);
                PidSnapshot::default()
            }
        }
    }
}

/// Apply the family's line rule to listing output and collect PIDs.
pub fn parse_listing(family: PlatformFamily, listing: &str) -> PidSnapshot {
    listing
        .lines()
        .filter(|line| is_daemon_line(family, line))
        .filter_map(|line| {
            let pid = pid_token(line);
            if pid.is_none() {
                debug!("Matching line without a PID column: {}", line);
            }
            pid
        })
        .collect::<Vec<_>>()
        .into()
}

fn is_daemon_line(family: PlatformFamily, line: &str) -> bool {
    match family {
        PlatformFamily::Windows => DaemonConfig::WINDOWS_IMAGE_NAMES
            .iter()
            .any(|name| line.starts_with(name)),
        PlatformFamily::Linux | PlatformFamily::OtherUnix => {
            DaemonConfig::UNIX_CMDLINE_MARKERS
                .iter()
                .any(|marker| line.contains(marker))
                && line
                    .split_whitespace()
                    .any(|token| token.starts_with(DaemonConfig::UNIX_STATE_PREFIX))
        }
    }
}

/// The PID is the second whitespace-separated column in every listing format.
fn pid_token(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}
