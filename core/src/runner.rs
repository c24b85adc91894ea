//! # Process Runner
//!
//! Runs one external command under `sh -c` and feeds its output to the
//! [`PatternMatcher`] while it runs.
//!
//! Lifecycle of a run: wait for a scan slot, log the command, spawn, track,
//! match both streams until EOF, reap, untrack. A shutdown at any point
//! before the spawn means the command never starts. A shutdown after the
//! spawn sends `SIGTERM` to the command's process group, waits out the grace
//! period and follows up with `SIGKILL`.

use std::collections::HashMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use rekon_common::finding::Finding;
use rekon_common::tag::Tag;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::audit::AuditLog;
use crate::governor::Governor;
use crate::matcher::PatternMatcher;
use crate::shutdown::Shutdown;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed while waiting for command: {0}")]
    Io(#[from] io::Error),

    #[error("cancelled by shutdown")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub duration: Duration,
    pub findings: Vec<Finding>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct TrackedProcess {
    pub pid: u32,
    pub tag: Tag,
    pub started: Instant,
}

/// Every process currently running, across all targets of a run.
///
/// Touched by the runners and by the signal handler, hence the lock.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    running: Mutex<HashMap<u64, TrackedProcess>>,
    next_id: AtomicU64,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `pid` until the returned guard is dropped.
    pub fn register(self: &Arc<Self>, pid: u32, tag: &Tag) -> TrackerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            id,
            TrackedProcess {
                pid,
                tag: tag.clone(),
                started: Instant::now(),
            },
        );

        TrackerGuard {
            tracker: Arc::clone(self),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<TrackedProcess> {
        self.lock().values().cloned().collect()
    }

    /// Sends `SIGTERM` to every tracked process group.
    pub fn terminate_all(&self) -> usize {
        self.signal_all(Signal::SIGTERM)
    }

    /// Sends `SIGKILL` to every tracked process group. Last resort for the
    /// signal handler when runners did not get to clean up themselves.
    pub fn kill_all(&self) -> usize {
        self.signal_all(Signal::SIGKILL)
    }

    fn signal_all(&self, signal: Signal) -> usize {
        let processes = self.snapshot();
        for process in &processes {
            signal_group(process.pid, signal);
        }
        processes.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, TrackedProcess>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Untracks its process on drop.
#[derive(Debug)]
pub struct TrackerGuard {
    tracker: Arc<ProcessTracker>,
    id: u64,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.tracker.lock().remove(&self.id);
    }
}

fn signal_group(pid: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };

    // ESRCH just means the group is already gone.
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        debug!("Failed to send {signal} to process group {pid}: {e}");
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    governor: Governor,
    tracker: Arc<ProcessTracker>,
    audit: Arc<AuditLog>,
    shutdown: Shutdown,
    grace_period: Duration,
}

impl ProcessRunner {
    pub fn new(
        governor: Governor,
        tracker: Arc<ProcessTracker>,
        audit: Arc<AuditLog>,
        shutdown: Shutdown,
        grace_period: Duration,
    ) -> Self {
        Self {
            governor,
            tracker,
            audit,
            shutdown,
            grace_period,
        }
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub async fn run(
        &self,
        command: &str,
        tag: &Tag,
        matcher: PatternMatcher,
    ) -> Result<RunOutcome, RunnerError> {
        let mut shutdown = self.shutdown.listener();

        let slot = tokio::select! {
            biased;
            _ = shutdown.triggered() => return Err(RunnerError::Cancelled),
            slot = self.governor.acquire_scan_slot() => {
                slot.map_err(|_| RunnerError::Cancelled)?
            }
        };
        if shutdown.is_triggered() {
            return Err(RunnerError::Cancelled);
        }

        self.audit.command(tag, command);
        debug!("[{tag}] {command}");

        let started = Instant::now();
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let pid = child.id();
        let _tracked = pid.map(|pid| self.tracker.register(pid, tag));
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = tokio::select! {
            biased;
            _ = shutdown.triggered() => None,
            result = drive(&mut child, stdout, stderr, matcher) => Some(result),
        };

        let Some((findings, status)) = finished else {
            self.terminate(&mut child, pid, tag).await;
            self.governor.release_scan_slot(slot);
            return Err(RunnerError::Cancelled);
        };
        self.governor.release_scan_slot(slot);

        let exit_code = status?.code().unwrap_or(-1);
        let duration = started.elapsed();

        if exit_code != 0 {
            self.audit.error(tag, exit_code);
        }
        self.audit
            .info(tag, format!("finished with exit code {exit_code}"));

        Ok(RunOutcome {
            exit_code,
            duration,
            findings,
        })
    }

    /// Graceful first, forceful after the grace period. Never waits longer
    /// than that on a hung command.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>, tag: &Tag) {
        if let Some(pid) = pid {
            signal_group(pid, Signal::SIGTERM);
        }

        if timeout(self.grace_period, child.wait()).await.is_ok() {
            return;
        }

        warn!("{tag} ignored SIGTERM, killing it");
        if let Some(pid) = pid {
            signal_group(pid, Signal::SIGKILL);
        }
        if let Err(e) = child.kill().await {
            debug!("Failed to kill {tag}: {e}");
        }
    }
}

async fn drive(
    child: &mut Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    matcher: PatternMatcher,
) -> (Vec<Finding>, io::Result<ExitStatus>) {
    let out = async {
        match stdout {
            Some(stdout) => matcher.clone().match_stream(BufReader::new(stdout)).await,
            None => Vec::new(),
        }
    };
    let err = async {
        match stderr {
            Some(stderr) => matcher.clone().match_stream(BufReader::new(stderr)).await,
            None => Vec::new(),
        }
    };

    let (mut findings, errors) = tokio::join!(out, err);
    findings.extend(errors);

    (findings, child.wait().await)
}
