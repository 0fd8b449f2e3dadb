// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! OS process plumbing
//!
//! Spawning (detached session or private process group), signalling whole
//! process groups, liveness probing and captured blocking waits.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::constants::{exit_codes, lifecycle};
use crate::domain::ports::ProcessProbe;
use crate::domain::{DomainError, Result};

/// Where a child's stdout/stderr go.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OutputMode {
    Capture,
    LogFile(PathBuf),
    Discard,
}

pub(crate) struct SpawnSpec<'a> {
    pub program: &'a OsStr,
    pub args: &'a [String],
    pub working_directory: Option<&'a Path>,
    pub environment: &'a BTreeMap<String, String>,
    pub output: OutputMode,
    /// New session (background units) instead of a private process group.
    pub detach: bool,
}

pub(crate) fn spawn(spec: &SpawnSpec<'_>) -> io::Result<Child> {
    let mut cmd = Command::new(spec.program);
    cmd.args(spec.args)
        .envs(spec.environment)
        .stdin(Stdio::null());
    if let Some(dir) = spec.working_directory {
        cmd.current_dir(dir);
    }

    match &spec.output {
        OutputMode::Capture => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        OutputMode::LogFile(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let stderr = file.try_clone()?;
            cmd.stdout(Stdio::from(file)).stderr(Stdio::from(stderr));
        }
        OutputMode::Discard => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    if spec.detach {
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            cmd.pre_exec(|| unistd::setsid().map(|_| ()).map_err(io::Error::from));
        }
    } else {
        cmd.process_group(0);
    }

    let child = cmd.spawn()?;
    debug!(
        program = ?spec.program,
        pid = ?child.id(),
        detach = spec.detach,
        "Spawned child"
    );
    Ok(child)
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 1)
        .map(Pid::from_raw)
}

/// Signals the process group led by `pid`. Every unit this crate spawns leads
/// its own group. A group that no longer exists counts as delivered.
pub(crate) fn signal_group(pid: u32, sig: Signal) -> Result<()> {
    let target = to_pid(pid).ok_or_else(|| DomainError::Signal {
        pid,
        reason: "refusing to signal a reserved pid".to_string(),
    })?;
    match signal::killpg(target, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(DomainError::Signal {
            pid,
            reason: e.to_string(),
        }),
    }
}

/// Exit code, or `128 + signal` for a child killed by a signal.
pub(crate) fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => exit_codes::SIGNAL_BASE + sig,
        (None, None) => exit_codes::UNKNOWN,
    }
}

/// `kill(pid, 0)`; EPERM means the process exists under another user. A
/// zombie waiting for a parent that never reaps it counts as gone.
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Some(target) = to_pid(pid) else {
            return false;
        };
        matches!(signal::kill(target, None), Ok(()) | Err(Errno::EPERM)) && !is_zombie(pid)
    }
}

/// Reads the state field of `/proc/<pid>/stat`. False where procfs is absent.
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The command name may contain spaces and parentheses.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        == Some("Z")
}

/// Outcome of a blocking, output-capturing wait.
#[derive(Debug)]
pub(crate) struct CapturedRun {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Waits for `child` while draining its pipes. On timeout the whole process
/// group is killed and reaped before returning.
pub(crate) async fn wait_captured(mut child: Child, timeout: Option<Duration>) -> io::Result<CapturedRun> {
    let pid = child.id();
    let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_all(pipe)));
    let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_all(pipe)));

    let waited = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
        None => Some(child.wait().await),
    };

    let (exit_code, timed_out) = match waited {
        Some(status) => (exit_code_of(status?), false),
        None => {
            warn!(pid = ?pid, timeout = ?timeout, "Run timed out, killing process group");
            if let Some(pid) = pid
                && let Err(e) = signal_group(pid, Signal::SIGKILL)
            {
                warn!(pid, error = %e, "Failed to kill process group");
            }
            let _ = child.start_kill();
            child.wait().await?;
            (exit_codes::TIMEOUT, true)
        }
    };

    let drain = Duration::from_millis(lifecycle::OUTPUT_DRAIN_TIMEOUT_MS);
    Ok(CapturedRun {
        exit_code,
        stdout: collect(stdout, drain).await,
        stderr: collect(stderr, drain).await,
        timed_out,
    })
}

async fn read_all<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!(error = %e, "Pipe read ended early");
    }
    buf
}

// A grandchild that escaped the group can hold a pipe open forever.
async fn collect(reader: Option<JoinHandle<Vec<u8>>>, limit: Duration) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    match tokio::time::timeout(limit, reader).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}
