// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised subprocess execution: spawn the run's
//! entrypoint in its own process group, capture combined stdout+stderr
//! up to a cap, and enforce `Properties::timeout` with a staged
//! SIGTERM → grace period → SIGKILL escalation so a hung or
//! signal-ignoring run (and any descendants it left behind) can't wedge
//! the agent.

use crate::report::SandboxOutcome;
use joshua_core::{OUTPUT_CAP, TRUNCATED_MARKER};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Child;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Wall-clock budget for the run, from `Properties::timeout`.
    pub timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub term_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            term_grace: Duration::from_secs(5),
        }
    }
}

struct Capture {
    data: Vec<u8>,
    truncated: bool,
}

async fn drain(mut reader: impl tokio::io::AsyncRead + Unpin, buf: Arc<Mutex<Capture>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut captured = buf.lock().unwrap_or_else(|e| e.into_inner());
                if captured.data.len() < OUTPUT_CAP {
                    let remaining = OUTPUT_CAP - captured.data.len();
                    let take = remaining.min(n);
                    captured.data.extend_from_slice(&chunk[..take]);
                    if take < n {
                        captured.truncated = true;
                    }
                } else {
                    captured.truncated = true;
                }
            }
        }
    }
}

/// Send `signal` to the run's entire process group (the run's pid
/// doubles as its pgid, set at spawn time).
fn signal_group(pid: u32, signal: Signal) {
    let pgid = Pid::from_raw(pid as i32);
    if let Err(err) = killpg(pgid, signal) {
        tracing::debug!(pid, %signal, %err, "failed to signal run's process group (likely already exited)");
    }
}

async fn escalate_and_wait(mut child: Child, pid: u32, term_grace: Duration) -> io::Result<std::process::ExitStatus> {
    signal_group(pid, Signal::SIGTERM);
    match tokio::time::timeout(term_grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(pid, "run did not exit within grace period after SIGTERM, sending SIGKILL");
            signal_group(pid, Signal::SIGKILL);
            child.wait().await
        }
    }
}

/// Run `entrypoint` in `cwd` and collect its outcome.
pub async fn run(entrypoint: &Path, cwd: &Path, options: RunOptions) -> io::Result<SandboxOutcome> {
    let mut cmd = tokio::process::Command::new(entrypoint);
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;
    let pid = child.id().ok_or_else(|| io::Error::other("child exited before its pid could be read"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child's stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child's stderr was not piped"))?;
    let capture = Arc::new(Mutex::new(Capture {
        data: Vec::new(),
        truncated: false,
    }));
    let stdout_task = tokio::spawn(drain(stdout, capture.clone()));
    let stderr_task = tokio::spawn(drain(stderr, capture.clone()));

    let (status, timed_out) = match tokio::time::timeout(options.timeout, child.wait()).await {
        Ok(status) => (status?, false),
        Err(_) => {
            tracing::warn!(pid, timeout_secs = options.timeout.as_secs(), "run exceeded its timeout, escalating");
            (escalate_and_wait(child, pid, options.term_grace).await?, true)
        }
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let elapsed_seconds = start.elapsed().as_secs();
    let mut captured = Arc::try_unwrap(capture)
        .map(|m| m.into_inner().unwrap_or_else(|e| e.into_inner()))
        .unwrap_or_else(|shared| {
            let guard = shared.lock().unwrap_or_else(|e| e.into_inner());
            Capture {
                data: guard.data.clone(),
                truncated: guard.truncated,
            }
        });
    if captured.truncated {
        captured.data.extend_from_slice(TRUNCATED_MARKER.as_bytes());
    }

    Ok(SandboxOutcome::from_exit_code(
        status.code(),
        elapsed_seconds,
        captured.data,
        timed_out,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    async fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, body).await.unwrap();
        let mut perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&path, perms).await.unwrap();
        path
    }

    #[tokio::test]
    async fn captures_stdout_and_classifies_pass() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "joshua_test", "#!/bin/sh\necho hello\nexit 0\n").await;
        let outcome = run(&script, tmp.path(), RunOptions::default()).await.unwrap();
        assert!(outcome.exit_class.is_pass());
        assert_eq!(String::from_utf8_lossy(&outcome.output).trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_classified_as_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "joshua_test", "#!/bin/sh\nexit 7\n").await;
        let outcome = run(&script, tmp.path(), RunOptions::default()).await.unwrap();
        assert!(!outcome.exit_class.is_pass());
    }

    #[tokio::test]
    async fn hung_process_is_killed_after_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "joshua_test", "#!/bin/sh\ntrap '' TERM\nsleep 30\n").await;
        let options = RunOptions {
            timeout: Duration::from_millis(200),
            term_grace: Duration::from_millis(200),
        };
        let start = Instant::now();
        let outcome = run(&script, tmp.path(), options).await.unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.exit_class.is_pass());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
