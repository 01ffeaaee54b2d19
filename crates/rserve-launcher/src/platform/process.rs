//! Platform-specific process control for launched daemons.

use crate::error::{LauncherError, Result};
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)` via nix
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None::<Signal>) {
            Ok(()) => true,
            // The process exists but belongs to someone else.
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        is_process_alive_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        let _ = pid;
        true
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn is_process_alive_windows(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    // SAFETY: OpenProcess takes plain integers and returns a handle or null;
    // a non-null handle is closed exactly once before returning.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            false
        } else {
            CloseHandle(handle);
            true
        }
    }
}

/// Terminate a daemon and, on Windows, its process tree.
///
/// # Platform Behavior
/// - **Linux/macOS**: SIGTERM, wait up to `timeout_ms`, then SIGKILL
/// - **Windows**: `taskkill /PID {pid} /F /T`
///
/// Returns `true` if the process is gone afterwards (or was never running).
pub fn terminate_process_tree(pid: u32, timeout_ms: u64) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_unix(pid, timeout_ms)
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        terminate_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout_ms;
        Err(LauncherError::Other(
            "Process termination not implemented for this platform".into(),
        ))
    }
}

#[cfg(unix)]
fn terminate_unix(pid: u32, timeout_ms: u64) -> Result<bool> {
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;
    use std::thread::sleep;
    use std::time::Duration;

    let raw = i32::try_from(pid)
        .map_err(|_| LauncherError::Other(format!("PID {} out of range", pid)))?;
    let nix_pid = Pid::from_raw(raw);

    debug!("Sending SIGTERM to process {}", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    let wait_interval = Duration::from_millis(100);
    let iterations = (timeout_ms / 100).max(1);

    for _ in 0..iterations {
        sleep(wait_interval);
        // Reap if it happens to be our child; ECHILD otherwise.
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        return Err(LauncherError::Other(format!(
            "Failed to kill process {}: {}",
            pid, e
        )));
    }

    sleep(Duration::from_millis(100));
    let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));

    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn terminate_windows(pid: u32) -> Result<bool> {
    use std::process::Command;

    debug!("Terminating process {} with taskkill", pid);

    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F", "/T"])
        .output()
        .map_err(|e| LauncherError::SpawnFailed {
            command: "taskkill".to_string(),
            source: e,
        })?;

    if output.status.success() {
        Ok(true)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") || stderr.contains("not running") {
            Ok(true)
        } else {
            warn!("taskkill failed for {}: {}", pid, stderr);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
    }

    #[test]
    fn test_terminate_nonexistent() {
        let result = terminate_process_tree(4_000_000_000, 100);
        assert!(result.unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(is_process_alive(pid));

        assert!(terminate_process_tree(pid, 500).unwrap());
        let _ = child.wait();
    }
}
