// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Lifecycle controller
//!
//! Starts, stops and waits on the three kinds of units of work. Registry
//! bookkeeping happens under the registry lock; signalling and waiting
//! happen outside of it.

use std::ffi::OsStr;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use tokio::process::Child;
use tokio::sync::{OwnedSemaphorePermit, watch};
use tracing::{debug, error, info, warn};

use super::registry::{
    ControlTarget, ExitOutcome, ExitReceiver, LiveControl, SharedRegistry, lock,
};
use super::tasks::{self, TaskContext};
use super::worker_pool::WorkerPool;
use super::workers::{self, WorkerRegistry};
use crate::constants::{exit_codes, lifecycle};
use crate::domain::entities::{ProcessHandle, ProcessResult, RunDetails};
use crate::domain::services::ReconciliationService;
use crate::domain::value_objects::{HandleId, ProcessKind, ProcessStatus};
use crate::domain::{CommandRequest, DomainError, Result, WorkerRequest};
use crate::infrastructure::os_process::{self, OutputMode, SpawnSpec};

pub(crate) struct LifecycleController {
    pool: WorkerPool,
    workers: WorkerRegistry,
    worker_program: Option<PathBuf>,
    grace_period: Duration,
    reconciler: ReconciliationService,
}

/// What a stop has to act on, captured under the lock.
enum StopPlan {
    Live(LiveControl),
    /// No control reference; only the recorded pid is left.
    Orphan(Option<u32>),
}

enum Waiter {
    Live(ExitReceiver),
    Orphan(Option<u32>),
}

impl LifecycleController {
    pub fn new(
        pool: WorkerPool,
        workers: WorkerRegistry,
        worker_program: Option<PathBuf>,
        grace_period: Duration,
        reconciler: ReconciliationService,
    ) -> Self {
        Self {
            pool,
            workers,
            worker_program,
            grace_period,
            reconciler,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    // ------------------------------------------------------------------
    // Blocking runs
    // ------------------------------------------------------------------

    pub async fn run_external(&self, request: &CommandRequest) -> Result<ProcessResult> {
        request.validate()?;
        let handle_id =
            HandleId::resolve(request.handle_id.as_deref(), ProcessKind::ExternalCommand)?;
        let handle = ProcessHandle::builder(
            handle_id,
            ProcessKind::ExternalCommand,
            request.description(),
        )
        .working_directory(request.working_directory.clone())
        .environment(request.environment.clone())
        .build()?;

        self.run_blocking(
            handle,
            OsStr::new(&request.args[0]),
            &request.args[1..],
            request.timeout,
        )
        .await
    }

    pub async fn run_worker(&self, request: &WorkerRequest) -> Result<serde_json::Value> {
        request.validate()?;
        self.ensure_worker(&request.function)?;
        let program = self.worker_program()?;
        let args = workers::worker_args(&request.function, &request.args)?;
        let handle_id =
            HandleId::resolve(request.handle_id.as_deref(), ProcessKind::WorkerFunction)?;
        let handle =
            ProcessHandle::builder(handle_id, ProcessKind::WorkerFunction, &request.function)
                .build()?;

        let _permit = self.pool.acquire().await?;
        let result = self
            .run_blocking(handle, program.as_os_str(), &args, request.timeout)
            .await?;

        if result.timed_out() {
            return Err(DomainError::TimeoutExceeded {
                description: request.function.clone(),
                timeout: request.timeout.unwrap_or(result.duration()),
            });
        }
        if !result.success() {
            let stderr = result.stderr().trim();
            let message = if stderr.is_empty() {
                format!("exited with code {}", result.exit_code())
            } else {
                stderr.to_string()
            };
            return Err(DomainError::WorkerFailed {
                function: request.function.clone(),
                message,
            });
        }
        workers::decode_worker_output(result.stdout()).map_err(|message| {
            DomainError::WorkerFailed {
                function: request.function.clone(),
                message,
            }
        })
    }

    /// Runs in a private process group with captured output. The handle is
    /// never registered.
    async fn run_blocking(
        &self,
        mut handle: ProcessHandle,
        program: &OsStr,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessResult> {
        let started = Instant::now();
        let spawned = os_process::spawn(&SpawnSpec {
            program,
            args,
            working_directory: handle.working_directory(),
            environment: handle.environment(),
            output: OutputMode::Capture,
            detach: false,
        });
        let child = spawned.map_err(|e| {
            warn!(description = handle.description(), error = %e, "Launch failed");
            DomainError::launch_failure(handle.description(), e)
        })?;

        handle.mark_running(child.id())?;
        debug!(
            handle_id = %handle.handle_id(),
            pid = ?handle.os_process_id(),
            timeout = ?timeout,
            "Running blocking unit of work"
        );

        let run = os_process::wait_captured(child, timeout)
            .await
            .map_err(|e| DomainError::launch_failure(handle.description(), e))?;

        if run.exit_code == exit_codes::SUCCESS && !run.timed_out {
            handle.mark_stopped(run.exit_code)?;
        } else {
            handle.mark_failed(run.exit_code)?;
            warn!(
                handle_id = %handle.handle_id(),
                description = handle.description(),
                exit_code = run.exit_code,
                timed_out = run.timed_out,
                "Blocking run failed"
            );
        }

        Ok(ProcessResult::new(
            handle,
            RunDetails {
                stdout: run.stdout,
                stderr: run.stderr,
                duration: started.elapsed(),
                timed_out: run.timed_out,
                forced: run.timed_out,
            },
        ))
    }

    // ------------------------------------------------------------------
    // Background starts
    // ------------------------------------------------------------------

    pub fn start_external(
        &self,
        registry: &SharedRegistry,
        request: &CommandRequest,
    ) -> Result<ProcessHandle> {
        request.validate()?;
        let handle_id =
            HandleId::resolve(request.handle_id.as_deref(), ProcessKind::ExternalCommand)?;
        let handle = ProcessHandle::builder(
            handle_id,
            ProcessKind::ExternalCommand,
            request.description(),
        )
        .log_file(request.log_file.clone())
        .working_directory(request.working_directory.clone())
        .environment(request.environment.clone())
        .build()?;

        self.launch_detached(
            registry,
            handle,
            OsStr::new(&request.args[0]),
            &request.args[1..],
            None,
        )
    }

    /// Suspends while the worker pool is saturated.
    pub async fn start_worker(
        &self,
        registry: &SharedRegistry,
        request: &WorkerRequest,
    ) -> Result<ProcessHandle> {
        request.validate()?;
        self.ensure_worker(&request.function)?;
        let program = self.worker_program()?;
        let args = workers::worker_args(&request.function, &request.args)?;
        let handle_id =
            HandleId::resolve(request.handle_id.as_deref(), ProcessKind::WorkerFunction)?;
        lock(registry).ensure_available(&handle_id)?;

        let permit = self.pool.acquire().await?;
        let handle =
            ProcessHandle::builder(handle_id, ProcessKind::WorkerFunction, &request.function)
                .log_file(request.log_file.clone())
                .build()?;

        self.launch_detached(registry, handle, program.as_os_str(), &args, Some(permit))
    }

    /// Spawns in a new session and registers the handle. A launch failure is
    /// recorded as a `Failed` handle before the error is returned.
    fn launch_detached(
        &self,
        registry: &SharedRegistry,
        mut handle: ProcessHandle,
        program: &OsStr,
        args: &[String],
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<ProcessHandle> {
        let mut guard = lock(registry);
        guard.ensure_available(handle.handle_id())?;

        let output = match handle.log_file() {
            Some(path) => OutputMode::LogFile(path.to_path_buf()),
            None => OutputMode::Discard,
        };
        let spawned = os_process::spawn(&SpawnSpec {
            program,
            args,
            working_directory: handle.working_directory(),
            environment: handle.environment(),
            output,
            detach: true,
        })
        .and_then(|child| match child.id() {
            Some(pid) => Ok((child, pid)),
            None => Err(std::io::Error::other("process exited before its pid was read")),
        });

        match spawned {
            Ok((child, pid)) => {
                handle.mark_running(Some(pid))?;
                let control = LiveControl {
                    target: ControlTarget::OsProcess { pid },
                    exit: monitor_child(child, pid, permit),
                };
                info!(
                    handle_id = %handle.handle_id(),
                    kind = %handle.kind(),
                    pid,
                    description = handle.description(),
                    "Started background unit of work"
                );
                guard.insert(handle.clone(), Some(control))?;
                Ok(handle)
            }
            Err(e) => {
                let failure = DomainError::launch_failure(handle.description(), &e);
                handle.mark_failed(exit_codes::LAUNCH_FAILED)?;
                // The caller sees the failure right here.
                handle.mark_observed();
                error!(
                    handle_id = %handle.handle_id(),
                    description = handle.description(),
                    error = %e,
                    "Failed to launch background unit of work"
                );
                guard.insert(handle, None)?;
                Err(failure)
            }
        }
    }

    pub fn start_task<F, Fut>(
        &self,
        registry: &SharedRegistry,
        description: &str,
        handle_id: Option<&str>,
        task: F,
    ) -> Result<ProcessHandle>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let handle_id = HandleId::resolve(handle_id, ProcessKind::CooperativeTask)?;
        let mut handle =
            ProcessHandle::builder(handle_id.clone(), ProcessKind::CooperativeTask, description)
                .build()?;
        lock(registry).ensure_available(&handle_id)?;

        // Build the future outside the lock; it does not run until spawned.
        let context = TaskContext::new(handle_id.clone());
        let cancel = context.cancellation_token().clone();
        let future = task(context);

        let mut guard = lock(registry);
        guard.ensure_available(&handle_id)?;
        let control = tasks::spawn_task(handle_id, cancel, future);
        handle.mark_running(None)?;
        info!(
            handle_id = %handle.handle_id(),
            description = handle.description(),
            "Started cooperative task"
        );
        guard.insert(handle.clone(), Some(control))?;
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Stop
    // ------------------------------------------------------------------

    /// Returns false when the handle was already settled.
    pub async fn stop(&self, registry: &SharedRegistry, id: &str, force: bool) -> Result<bool> {
        let plan = {
            let mut guard = lock(registry);
            let entry = guard.get_mut(id)?;
            if entry.settle(false)? {
                debug!(handle_id = id, "Finished before the stop request");
            }
            let status = entry.handle.status();
            if status.is_settled() {
                debug!(handle_id = id, status = %status, "Stop is a no-op");
                return Ok(false);
            }
            if entry.control.is_none()
                && let Some(pid) = entry.handle.os_process_id()
                && !self.reconciler.is_alive(pid)
            {
                let next = ReconciliationService::mark_vanished(&mut entry.handle)?;
                info!(handle_id = id, pid, status = %next, "Process exited before the stop request");
                return Ok(false);
            }
            if status.can_stop() {
                entry.handle.mark_stopping()?;
            }
            match &entry.control {
                Some(control) => StopPlan::Live(control.clone()),
                None => StopPlan::Orphan(entry.handle.os_process_id()),
            }
        };

        info!(handle_id = id, force, "Stopping unit of work");
        let orphan_exit = match plan {
            StopPlan::Live(control) => {
                let forced = self.terminate_live(id, &control, force).await;
                let mut guard = lock(registry);
                if let Ok(entry) = guard.get_mut(id)
                    && !entry.settle(forced)?
                    && entry.handle.status().is_active()
                {
                    error!(handle_id = id, "Unit of work survived a forced kill");
                    entry.apply(
                        ExitOutcome {
                            exit_code: exit_codes::KILLED,
                            stdout: String::new(),
                            stderr: String::new(),
                            elapsed: entry.handle.elapsed(),
                        },
                        true,
                    )?;
                }
                return Ok(true);
            }
            StopPlan::Orphan(pid) => self.terminate_orphan(id, pid, force).await,
        };

        let (forced, exit_code) = orphan_exit;
        let mut guard = lock(registry);
        if let Ok(entry) = guard.get_mut(id)
            && entry.handle.status().is_active()
        {
            entry.handle.mark_stopped(exit_code)?;
            entry.details = Some(RunDetails {
                duration: entry.handle.elapsed(),
                forced,
                ..RunDetails::default()
            });
            info!(handle_id = id, exit_code, forced, "Stopped orphaned unit of work");
        }
        Ok(true)
    }

    /// Returns whether the kill was forced.
    async fn terminate_live(&self, id: &str, control: &LiveControl, force: bool) -> bool {
        let mut exit = control.exit.clone();
        let forced = if force {
            kill(&control.target);
            true
        } else {
            request_termination(&control.target);
            if wait_exit(&mut exit, self.grace_period).await {
                false
            } else {
                warn!(
                    handle_id = id,
                    grace_period = ?self.grace_period,
                    "Grace period expired, escalating to forced kill"
                );
                kill(&control.target);
                true
            }
        };

        let confirm = Duration::from_secs(lifecycle::KILL_CONFIRM_TIMEOUT_SEC);
        if !wait_exit(&mut exit, confirm).await {
            error!(handle_id = id, "No exit observed after termination");
        }
        forced
    }

    /// Signals a process known only by pid and polls until it disappears.
    /// Returns whether the kill was forced and the exit code to record.
    async fn terminate_orphan(&self, id: &str, pid: Option<u32>, force: bool) -> (bool, i32) {
        let Some(pid) = pid else {
            return (false, exit_codes::UNKNOWN);
        };
        if !force {
            if let Err(e) = os_process::signal_group(pid, Signal::SIGTERM) {
                warn!(handle_id = id, pid, error = %e, "Failed to send SIGTERM");
            }
            if self.wait_gone(pid, self.grace_period).await {
                return (false, exit_codes::SIGNAL_BASE + Signal::SIGTERM as i32);
            }
            warn!(handle_id = id, pid, "Grace period expired, escalating to SIGKILL");
        }
        if let Err(e) = os_process::signal_group(pid, Signal::SIGKILL) {
            warn!(handle_id = id, pid, error = %e, "Failed to send SIGKILL");
        }
        let confirm = Duration::from_secs(lifecycle::KILL_CONFIRM_TIMEOUT_SEC);
        if !self.wait_gone(pid, confirm).await {
            error!(handle_id = id, pid, "Process still present after SIGKILL");
        }
        (true, exit_codes::KILLED)
    }

    async fn wait_gone(&self, pid: u32, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let interval = Duration::from_millis(lifecycle::LIVENESS_POLL_INTERVAL_MS);
        while self.reconciler.is_alive(pid) {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
        true
    }

    // ------------------------------------------------------------------
    // Wait
    // ------------------------------------------------------------------

    pub async fn wait(
        &self,
        registry: &SharedRegistry,
        id: &str,
        timeout: Option<Duration>,
    ) -> Result<ProcessResult> {
        let (waiter, description) = {
            let mut guard = lock(registry);
            let entry = guard.get_mut(id)?;
            entry.settle(false)?;
            match entry.handle.status() {
                ProcessStatus::Unknown => return Err(DomainError::ControlLost(id.to_string())),
                status if status.is_terminal() => {
                    entry.handle.mark_observed();
                    return Ok(entry.result());
                }
                _ => {}
            }
            let waiter = match &entry.control {
                Some(control) => Waiter::Live(control.exit.clone()),
                None => Waiter::Orphan(entry.handle.os_process_id()),
            };
            (waiter, entry.handle.description().to_string())
        };

        let poll = Duration::from_millis(lifecycle::LIVENESS_POLL_INTERVAL_MS);
        let finished = async {
            match waiter {
                Waiter::Live(mut exit) => {
                    let _ = exit.wait_for(Option::is_some).await;
                }
                Waiter::Orphan(Some(pid)) => {
                    while self.reconciler.is_alive(pid) {
                        tokio::time::sleep(poll).await;
                    }
                }
                Waiter::Orphan(None) => {}
            }
        };
        if let Some(limit) = timeout {
            tokio::time::timeout(limit, finished)
                .await
                .map_err(|_| DomainError::TimeoutExceeded {
                    description,
                    timeout: limit,
                })?;
        } else {
            finished.await;
        }

        let mut guard = lock(registry);
        let entry = guard.get_mut(id)?;
        entry.settle(false)?;
        if entry.handle.status().is_active() && entry.control.is_none() {
            ReconciliationService::mark_vanished(&mut entry.handle)?;
        }
        if !entry.handle.status().is_terminal() {
            return Err(DomainError::ControlLost(id.to_string()));
        }
        entry.handle.mark_observed();
        Ok(entry.result())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn ensure_worker(&self, function: &str) -> Result<()> {
        if self.workers.contains(function) {
            return Ok(());
        }
        Err(DomainError::launch_failure(
            function,
            "no worker function registered under this name",
        ))
    }

    fn worker_program(&self) -> Result<PathBuf> {
        match &self.worker_program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe()
                .map_err(|e| DomainError::launch_failure("worker program", e)),
        }
    }
}

/// Reaps `child`, releases its pool slot and publishes the outcome.
fn monitor_child(
    mut child: Child,
    pid: u32,
    permit: Option<OwnedSemaphorePermit>,
) -> ExitReceiver {
    let started = Instant::now();
    let (tx, rx) = watch::channel(None);
    tokio::spawn(async move {
        let exit_code = match child.wait().await {
            Ok(status) => os_process::exit_code_of(status),
            Err(e) => {
                warn!(pid, error = %e, "Failed to wait for child");
                exit_codes::UNKNOWN
            }
        };
        drop(permit);
        debug!(pid, exit_code, "Child exited");
        let _ = tx.send(Some(ExitOutcome {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: started.elapsed(),
        }));
    });
    rx
}

/// True once an outcome is published (or its monitor is gone).
async fn wait_exit(exit: &mut ExitReceiver, limit: Duration) -> bool {
    matches!(
        tokio::time::timeout(limit, exit.wait_for(Option::is_some)).await,
        Ok(_)
    )
}

fn request_termination(target: &ControlTarget) {
    match target {
        ControlTarget::OsProcess { pid } => {
            if let Err(e) = os_process::signal_group(*pid, Signal::SIGTERM) {
                warn!(pid, error = %e, "Failed to send SIGTERM");
            }
        }
        ControlTarget::Task { cancel, .. } => cancel.cancel(),
    }
}

fn kill(target: &ControlTarget) {
    match target {
        ControlTarget::OsProcess { pid } => {
            if let Err(e) = os_process::signal_group(*pid, Signal::SIGKILL) {
                warn!(pid, error = %e, "Failed to send SIGKILL");
            }
        }
        ControlTarget::Task { abort, .. } => abort.abort(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::Registry;
    use crate::domain::ports::MockProcessProbe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    // Larger than any pid_max, so signals to it only ever see ESRCH.
    const UNUSED_PID: u32 = i32::MAX as u32;

    fn controller(alive: bool) -> LifecycleController {
        let mut probe = MockProcessProbe::new();
        probe.expect_is_alive().return_const(alive);
        LifecycleController::new(
            WorkerPool::new(1),
            WorkerRegistry::new(),
            None,
            Duration::from_millis(200),
            ReconciliationService::new(Arc::new(probe)),
        )
    }

    fn reloaded_registry() -> SharedRegistry {
        let mut handle = ProcessHandle::builder(
            HandleId::new("orphan").unwrap(),
            ProcessKind::ExternalCommand,
            "sleep 30",
        )
        .build()
        .unwrap();
        handle.mark_running(Some(UNUSED_PID)).unwrap();
        Mutex::new(Registry::from_handles(vec![handle]))
    }

    // Alive for the first check, gone once signalled.
    fn controller_dying_on_signal() -> LifecycleController {
        let calls = AtomicUsize::new(0);
        let mut probe = MockProcessProbe::new();
        probe
            .expect_is_alive()
            .returning(move |_| calls.fetch_add(1, Ordering::SeqCst) == 0);
        LifecycleController::new(
            WorkerPool::new(1),
            WorkerRegistry::new(),
            None,
            Duration::from_millis(200),
            ReconciliationService::new(Arc::new(probe)),
        )
    }

    #[tokio::test]
    async fn test_orphan_stop_records_sigterm_exit() {
        let registry = reloaded_registry();

        assert!(controller_dying_on_signal().stop(&registry, "orphan", false).await.unwrap());

        let guard = lock(&registry);
        let entry = guard.get("orphan").unwrap();
        assert_eq!(entry.handle.status(), ProcessStatus::Stopped);
        assert_eq!(entry.handle.exit_code(), Some(143));
        assert!(!entry.result().forced());
    }

    #[tokio::test]
    async fn test_stop_of_already_exited_orphan_is_a_noop() {
        let registry = reloaded_registry();

        assert!(!controller(false).stop(&registry, "orphan", false).await.unwrap());

        let guard = lock(&registry);
        let entry = guard.get("orphan").unwrap();
        assert_eq!(entry.handle.status(), ProcessStatus::Failed);
        assert_eq!(entry.handle.exit_code(), Some(exit_codes::UNKNOWN));
        assert!(!entry.result().forced());
    }

    #[tokio::test]
    async fn test_orphan_wait_marks_vanished_process_failed() {
        let registry = reloaded_registry();

        let result = controller(false).wait(&registry, "orphan", None).await.unwrap();

        assert_eq!(result.handle().status(), ProcessStatus::Failed);
        assert_eq!(result.exit_code(), exit_codes::UNKNOWN);
        assert!(lock(&registry).get("orphan").unwrap().handle.is_terminal_observed());
    }

    #[tokio::test]
    async fn test_wait_timeout_keeps_handle_active() {
        let registry = reloaded_registry();

        let err = controller(true)
            .wait(&registry, "orphan", Some(Duration::from_millis(150)))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::TimeoutExceeded { .. }));
        assert_eq!(
            lock(&registry).get("orphan").unwrap().handle.status(),
            ProcessStatus::Running
        );
    }

    #[tokio::test]
    async fn test_unknown_worker_is_a_launch_failure() {
        let registry = Mutex::new(Registry::default());
        let request = WorkerRequest::new("missing", serde_json::Value::Null);

        let err = controller(true).start_worker(&registry, &request).await.unwrap_err();

        assert!(matches!(err, DomainError::LaunchFailure { .. }));
        assert_eq!(lock(&registry).len(), 0);
    }

    #[tokio::test]
    async fn test_wait_exit_sees_published_outcome() {
        let (tx, mut rx) = watch::channel(None);
        assert!(!wait_exit(&mut rx, Duration::from_millis(20)).await);

        tx.send(Some(ExitOutcome {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
        }))
        .unwrap();
        assert!(wait_exit(&mut rx, Duration::from_millis(20)).await);
    }
}
