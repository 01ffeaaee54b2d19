//! Machine-readable output for `status` and `pids`.

use rserve_launcher::Supervisor;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub port: u16,
    pub running: bool,
    pub pids: Vec<u32>,
    pub platform: &'static str,
    pub r_home: Option<PathBuf>,
    pub library_dir: PathBuf,
    pub package_present: bool,
}

impl StatusReport {
    pub async fn collect(supervisor: &Supervisor, port: u16) -> Self {
        Self {
            port,
            running: supervisor.is_running(port).await,
            pids: supervisor.daemon_pids().await.pids().to_vec(),
            platform: supervisor.family().as_str(),
            r_home: supervisor.r_home().await.ok(),
            library_dir: supervisor.installer().library_dir().to_path_buf(),
            package_present: supervisor.installer().is_package_present(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.running { "running" } else { "not reachable" };
        writeln!(f, "Rserve on port {}: {}", self.port, state)?;
        writeln!(f, "  platform:    {}", self.platform)?;
        match &self.r_home {
            Some(home) => writeln!(f, "  R_HOME:      {}", home.display())?,
            None => writeln!(f, "  R_HOME:      not found")?,
        }
        writeln!(
            f,
            "  library:     {} ({})",
            self.library_dir.display(),
            if self.package_present {
                "Rserve present"
            } else {
                "Rserve missing"
            }
        )?;
        write!(f, "  PIDs:        {}", format_pids(&self.pids))
    }
}

#[derive(Debug, Serialize)]
pub struct PidReport {
    pub pids: Vec<u32>,
    pub newest: Option<u32>,
}

pub fn format_pids(pids: &[u32]) -> String {
    if pids.is_empty() {
        return "none".to_string();
    }
    pids.iter()
        .map(|pid| pid.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pids() {
        assert_eq!(format_pids(&[]), "none");
        assert_eq!(format_pids(&[7, 42]), "7, 42");
    }

    #[test]
    fn test_status_report_json_shape() {
        let report = StatusReport {
            port: 6311,
            running: false,
            pids: vec![],
            platform: "linux",
            r_home: None,
            library_dir: PathBuf::from("/tmp/lib"),
            package_present: false,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["port"], 6311);
        assert_eq!(json["running"], false);
        assert!(json["r_home"].is_null());
        assert_eq!(json["library_dir"], "/tmp/lib");

        let text = report.to_string();
        assert!(text.contains("not reachable"));
        assert!(text.contains("R_HOME:      not found"));
    }
}
