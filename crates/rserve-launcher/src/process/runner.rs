//! One-shot interpreter invocations: `R <args> -e "<expression>"`.

use super::capture::ChildOutput;
use crate::error::{LauncherError, Result};
use crate::platform::{self, PlatformFamily};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Runs R expressions through the interpreter's command line.
#[async_trait]
pub trait ExpressionRunner: Send + Sync {
    /// Start `interpreter <args> -e "<expression>"`.
    ///
    /// The expression is embedded verbatim between double quotes; callers must
    /// not pass expressions containing `"`. With `redirect` set, output goes to
    /// a timestamped `.Rout` file in the app directory. Returns `None` (after
    /// logging) when the process cannot be started.
    fn run(
        &self,
        expression: &str,
        interpreter: &str,
        interpreter_args: &str,
        redirect: bool,
    ) -> Option<Child>;

    /// Platform the runner dispatches for.
    fn family(&self) -> PlatformFamily;

    /// Run an expression to completion and return stdout then stderr text.
    ///
    /// Both streams are drained and joined before the text is returned. Where
    /// the interpreter call never returns (Windows), `settle` is slept instead
    /// of waiting on the process.
    async fn run_captured(
        &self,
        expression: &str,
        interpreter: &str,
        interpreter_args: &str,
        settle: Duration,
    ) -> Option<String> {
        let mut child = self.run(expression, interpreter, interpreter_args, false)?;
        let output = ChildOutput::capture(&mut child, true);
        let text = output.finish().await;

        if self.family().waits_for_exit() {
            if let Err(e) = child.wait().await {
                warn!("Failed to wait for interpreter: {}", e);
            }
        } else {
            tokio::time::sleep(settle).await;
        }

        Some(text)
    }
}

/// Assemble the shell command line for one invocation.
///
/// `2>&1` is only appended outside Windows, where the line goes through
/// `/bin/sh`.
pub fn build_command_line(
    family: PlatformFamily,
    expression: &str,
    interpreter: &str,
    interpreter_args: &str,
    redirect: Option<&Path>,
) -> String {
    let mut command = String::from(interpreter);
    if !interpreter_args.trim().is_empty() {
        command.push(' ');
        command.push_str(interpreter_args.trim());
    }
    command.push_str(&format!(" -e \"{}\"", expression));
    if let Some(file) = redirect {
        command.push_str(&format!(" > {}", file.display()));
        if !family.is_windows() {
            command.push_str(" 2>&1");
        }
    }
    command
}

/// The production [`ExpressionRunner`].
#[derive(Debug, Clone)]
pub struct CommandRunner {
    family: PlatformFamily,
    app_dir: PathBuf,
}

impl CommandRunner {
    /// Create a runner writing redirect files under `app_dir`.
    pub fn new(family: PlatformFamily, app_dir: impl AsRef<Path>) -> Self {
        Self {
            family,
            app_dir: app_dir.as_ref().to_path_buf(),
        }
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    fn spawn(
        &self,
        expression: &str,
        interpreter: &str,
        interpreter_args: &str,
        redirect: Option<&Path>,
    ) -> Result<Child> {
        let command_line = build_command_line(
            self.family,
            expression,
            interpreter,
            interpreter_args,
            redirect,
        );
        info!("Doing (in R): {}", command_line);

        let mut cmd = if self.family.is_windows() {
            self.direct_command(expression, interpreter, interpreter_args, redirect)?
        } else {
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c").arg(&command_line);
            cmd.stdout(Stdio::piped());
            cmd
        };
        cmd.stdin(Stdio::null());
        cmd.stderr(Stdio::piped());

        cmd.spawn().map_err(|e| LauncherError::SpawnFailed {
            command: command_line,
            source: e,
        })
    }

    /// Windows: run the interpreter itself, no shell in between.
    ///
    /// The redirect is realised by pointing stdout at the file.
    fn direct_command(
        &self,
        expression: &str,
        interpreter: &str,
        interpreter_args: &str,
        redirect: Option<&Path>,
    ) -> Result<Command> {
        let mut std_cmd = std::process::Command::new(interpreter);
        std_cmd.args(interpreter_args.split_whitespace());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            std_cmd.arg("-e").raw_arg(format!("\"{}\"", expression));
        }
        #[cfg(not(windows))]
        {
            std_cmd.arg("-e").arg(expression);
        }

        match redirect {
            Some(file) => {
                let out = fs::File::create(file)
                    .map_err(|e| LauncherError::io_with_path(e, file))?;
                std_cmd.stdout(Stdio::from(out));
            }
            None => {
                std_cmd.stdout(Stdio::piped());
            }
        }

        Ok(Command::from(std_cmd))
    }
}

#[async_trait]
impl ExpressionRunner for CommandRunner {
    fn run(
        &self,
        expression: &str,
        interpreter: &str,
        interpreter_args: &str,
        redirect: bool,
    ) -> Option<Child> {
        let redirect_file = redirect.then(|| platform::paths::rout_path(&self.app_dir));
        match self.spawn(
            expression,
            interpreter,
            interpreter_args,
            redirect_file.as_deref(),
        ) {
            Ok(child) => {
                debug!("Interpreter started with PID {:?}", child.id());
                Some(child)
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    fn family(&self) -> PlatformFamily {
        self.family
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_line_unix_redirect() {
        let line = build_command_line(
            PlatformFamily::Linux,
            "print(1)",
            "/usr/lib/R/bin/R",
            "--vanilla --silent",
            Some(Path::new("/tmp/rs/2026-10-18_09-41-07.Rout")),
        );
        assert_eq!(
            line,
            "/usr/lib/R/bin/R --vanilla --silent -e \"print(1)\" > /tmp/rs/2026-10-18_09-41-07.Rout 2>&1"
        );
    }

    #[test]
    fn test_command_line_windows_redirect_has_no_stderr_merge() {
        let line = build_command_line(
            PlatformFamily::Windows,
            "print(1)",
            "R.exe",
            "--vanilla",
            Some(Path::new("out.Rout")),
        );
        assert_eq!(line, "R.exe --vanilla -e \"print(1)\" > out.Rout");
    }

    #[test]
    fn test_command_line_without_redirect_or_args() {
        let line = build_command_line(PlatformFamily::OtherUnix, "q()", "R", "", None);
        assert_eq!(line, "R -e \"q()\"");
    }

    #[test]
    fn test_expression_is_not_escaped() {
        let line = build_command_line(
            PlatformFamily::Linux,
            "setwd('/a b'); print(getwd())",
            "R",
            "--vanilla",
            None,
        );
        assert!(line.contains("-e \"setwd('/a b'); print(getwd())\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captured_collects_stdout() {
        let temp_dir = TempDir::new().unwrap();
        let runner = CommandRunner::new(PlatformFamily::current(), temp_dir.path());

        let text = runner
            .run_captured("hello", "echo", "", Duration::ZERO)
            .await
            .unwrap();
        assert!(text.contains("hello"), "captured: {text:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_with_redirect_writes_rout_file() {
        let temp_dir = TempDir::new().unwrap();
        let runner = CommandRunner::new(PlatformFamily::current(), temp_dir.path());

        let mut child = runner.run("redirected", "echo", "", true).unwrap();
        child.wait().await.unwrap();

        let rout = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.path().extension().is_some_and(|ext| ext == "Rout"))
            .expect("redirect file");
        let content = std::fs::read_to_string(rout.path()).unwrap();
        assert!(content.contains("redirected"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_interpreter_reports_through_output() {
        // The shell starts fine; the failure shows up as text, not a spawn error.
        let temp_dir = TempDir::new().unwrap();
        let runner = CommandRunner::new(PlatformFamily::current(), temp_dir.path());
        let text = runner
            .run_captured("1", "/nonexistent/bin/R", "--vanilla", Duration::ZERO)
            .await
            .unwrap();
        assert!(!text.contains("[1] TRUE"));
    }

    #[tokio::test]
    async fn test_direct_spawn_failure_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let runner = CommandRunner::new(PlatformFamily::Windows, temp_dir.path());
        assert!(runner
            .run("1", "/nonexistent/bin/R.exe", "--vanilla", false)
            .is_none());
    }
}
