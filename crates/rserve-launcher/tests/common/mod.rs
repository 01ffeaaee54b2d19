//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use rserve_launcher::connection::{Connector, DaemonConnection};
use rserve_launcher::locator::InterpreterLocator;
use rserve_launcher::process::{ExpressionRunner, PidSnapshot, PidSource};
use rserve_launcher::{LauncherError, PlatformFamily, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;

/// Start a short-lived shell process standing in for the interpreter.
pub fn shell_child(script: &str) -> Child {
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("sh should be available")
}

/// Hands out PID listings in order, repeating the last one forever.
pub struct ScriptedPids {
    script: Mutex<VecDeque<Vec<u32>>>,
    last: Mutex<Vec<u32>>,
    pub calls: AtomicUsize,
}

impl ScriptedPids {
    pub fn new(script: Vec<Vec<u32>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PidSource for ScriptedPids {
    async fn list_daemon_pids(&self) -> PidSnapshot {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        PidSnapshot::new(last.clone())
    }
}

struct FakeConnection;

#[async_trait]
impl DaemonConnection for FakeConnection {
    async fn evaluate(&mut self, expression: &str) -> Result<String> {
        Ok(expression.to_string())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Refuses connections until attempt `succeed_on` (1-based), if ever.
pub struct ScriptedConnector {
    succeed_on: Option<usize>,
    pub attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn never() -> Self {
        Self {
            succeed_on: None,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn on_attempt(n: usize) -> Self {
        Self {
            succeed_on: Some(n),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DaemonConnection>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.succeed_on {
            Some(n) if attempt >= n => Ok(Box::new(FakeConnection)),
            _ => Err(LauncherError::Connection {
                host: host.to_string(),
                port,
                message: "refused".to_string(),
            }),
        }
    }
}

/// Records every invocation and starts `sh -c <script>` for it.
///
/// `None` as script makes every spawn fail.
pub struct CountingRunner {
    script: Option<String>,
    pub invocations: Mutex<Vec<(String, bool)>>,
}

impl CountingRunner {
    pub fn succeeding() -> Self {
        Self::with_script(Some("exit 0"))
    }

    pub fn failing() -> Self {
        Self::with_script(None)
    }

    pub fn with_script(script: Option<&str>) -> Self {
        Self {
            script: script.map(str::to_string),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn expressions(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(expression, _)| expression.clone())
            .collect()
    }
}

#[async_trait]
impl ExpressionRunner for CountingRunner {
    fn run(&self, expression: &str, _: &str, _: &str, redirect: bool) -> Option<Child> {
        self.invocations
            .lock()
            .unwrap()
            .push((expression.to_string(), redirect));
        self.script.as_deref().map(shell_child)
    }

    fn family(&self) -> PlatformFamily {
        PlatformFamily::Linux
    }
}

/// A single simulated host: starting Rserve makes its PID appear and its
/// port answer. Package membership is answered from `installed`.
pub struct FakeHost {
    daemon_up: AtomicBool,
    installed: AtomicBool,
    pub spawns: AtomicUsize,
    pub probes: AtomicUsize,
}

impl FakeHost {
    pub fn new(daemon_up: bool, installed: bool) -> Self {
        Self {
            daemon_up: AtomicBool::new(daemon_up),
            installed: AtomicBool::new(installed),
            spawns: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn is_up(&self) -> bool {
        self.daemon_up.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExpressionRunner for FakeHost {
    fn run(&self, expression: &str, _: &str, _: &str, _: bool) -> Option<Child> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        if expression.contains("installed.packages") {
            let answer = if self.installed.load(Ordering::SeqCst) {
                "TRUE"
            } else {
                "FALSE"
            };
            return Some(shell_child(&format!("printf '[1] {}\\n'", answer)));
        }
        if expression.contains("install.packages") {
            self.installed.store(true, Ordering::SeqCst);
            return Some(shell_child("printf '* DONE (Rserve)\\n'"));
        }
        self.daemon_up.store(true, Ordering::SeqCst);
        Some(shell_child("exit 0"))
    }

    fn family(&self) -> PlatformFamily {
        PlatformFamily::Linux
    }
}

#[async_trait]
impl PidSource for FakeHost {
    async fn list_daemon_pids(&self) -> PidSnapshot {
        if self.is_up() {
            PidSnapshot::new(vec![100, 4242])
        } else {
            PidSnapshot::new(vec![100])
        }
    }
}

#[async_trait]
impl Connector for FakeHost {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DaemonConnection>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.is_up() {
            Ok(Box::new(FakeConnection))
        } else {
            Err(LauncherError::Connection {
                host: host.to_string(),
                port,
                message: "refused".to_string(),
            })
        }
    }
}

/// Always reports the same R_HOME.
pub struct FixedLocator(pub Option<PathBuf>);

#[async_trait]
impl InterpreterLocator for FixedLocator {
    async fn locate_r_home(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

/// Records when each spawn and each connection attempt happened.
///
/// The daemon of spawn `i` shows up in the process table as PID `1000 + i`
/// once `visible_after` has passed since that spawn. Connections always
/// succeed.
pub struct TimedHost {
    start: Instant,
    visible_after: Duration,
    pub spawn_times: Mutex<Vec<Duration>>,
    pub connect_times: Mutex<Vec<Duration>>,
}

impl TimedHost {
    pub fn new(visible_after: Duration) -> Self {
        Self {
            start: Instant::now(),
            visible_after,
            spawn_times: Mutex::new(Vec::new()),
            connect_times: Mutex::new(Vec::new()),
        }
    }

    pub fn spawn_times(&self) -> Vec<Duration> {
        self.spawn_times.lock().unwrap().clone()
    }

    pub fn connect_times(&self) -> Vec<Duration> {
        self.connect_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExpressionRunner for TimedHost {
    fn run(&self, _: &str, _: &str, _: &str, _: bool) -> Option<Child> {
        self.spawn_times.lock().unwrap().push(self.start.elapsed());
        Some(shell_child("exit 0"))
    }

    fn family(&self) -> PlatformFamily {
        PlatformFamily::Linux
    }
}

#[async_trait]
impl PidSource for TimedHost {
    async fn list_daemon_pids(&self) -> PidSnapshot {
        let now = self.start.elapsed();
        let pids = self
            .spawn_times
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, spawned)| now >= **spawned + self.visible_after)
            .map(|(i, _)| 1000 + i as u32)
            .collect();
        PidSnapshot::new(pids)
    }
}

#[async_trait]
impl Connector for TimedHost {
    async fn connect(&self, _: &str, _: u16) -> Result<Box<dyn DaemonConnection>> {
        self.connect_times.lock().unwrap().push(self.start.elapsed());
        Ok(Box::new(FakeConnection))
    }
}
