// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Cooperative tasks
//! Futures on the manager's own runtime. Graceful stop cancels the task's
//! token; forced stop aborts it.

use std::future::Future;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::{ControlTarget, ExitOutcome, LiveControl};
use crate::constants::exit_codes;
use crate::domain::value_objects::HandleId;

/// Handed to every cooperative task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    handle_id: HandleId,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(handle_id: HandleId) -> Self {
        Self {
            handle_id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn handle_id(&self) -> &HandleId {
        &self.handle_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once a graceful stop was requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Spawns `task` and a monitor publishing its outcome.
pub(crate) fn spawn_task<Fut>(handle_id: HandleId, cancel: CancellationToken, task: Fut) -> LiveControl
where
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    let started = Instant::now();
    let inner = tokio::spawn(task);
    let abort = inner.abort_handle();
    let (tx, rx) = watch::channel(None);

    tokio::spawn(async move {
        let (exit_code, stdout, stderr) = match inner.await {
            Ok(Ok(output)) => (exit_codes::SUCCESS, output, String::new()),
            Ok(Err(e)) => (exit_codes::TASK_FAILED, String::new(), format!("{e:#}")),
            Err(e) if e.is_cancelled() => (exit_codes::KILLED, String::new(), "task aborted".to_string()),
            Err(e) => (exit_codes::TASK_PANICKED, String::new(), panic_message(e)),
        };
        debug!(handle_id = %handle_id, exit_code, "Cooperative task ended");
        let _ = tx.send(Some(ExitOutcome {
            exit_code,
            stdout,
            stderr,
            elapsed: started.elapsed(),
        }));
    });

    LiveControl {
        target: ControlTarget::Task { cancel, abort },
        exit: rx,
    }
}

fn panic_message(error: JoinError) -> String {
    let Ok(payload) = error.try_into_panic() else {
        return "task failed".to_string();
    };
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("task panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("task panicked: {message}")
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn finish(control: &LiveControl) -> ExitOutcome {
        let mut exit = control.exit.clone();
        tokio::time::timeout(Duration::from_secs(2), exit.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();
        let outcome = exit.borrow().clone();
        outcome.unwrap()
    }

    fn id(name: &str) -> HandleId {
        HandleId::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_ok_output_becomes_stdout() {
        let control = spawn_task(id("t"), CancellationToken::new(), async {
            Ok("done".to_string())
        });
        let outcome = finish(&control).await;
        assert_eq!(outcome.exit_code, exit_codes::SUCCESS);
        assert_eq!(outcome.stdout, "done");
    }

    #[tokio::test]
    async fn test_error_becomes_stderr() {
        let control = spawn_task(id("t"), CancellationToken::new(), async {
            Err(anyhow::anyhow!("no route to host"))
        });
        let outcome = finish(&control).await;
        assert_eq!(outcome.exit_code, exit_codes::TASK_FAILED);
        assert_eq!(outcome.stderr, "no route to host");
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let control = spawn_task(id("t"), CancellationToken::new(), async {
            if true {
                panic!("kaboom");
            }
            Ok(String::new())
        });
        let outcome = finish(&control).await;
        assert_eq!(outcome.exit_code, exit_codes::TASK_PANICKED);
        assert!(outcome.stderr.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_cancellation_and_abort() {
        let context = TaskContext::new(id("t"));
        let token = context.cancellation_token().clone();
        let control = spawn_task(id("t"), token.clone(), async move {
            context.cancelled().await;
            Ok("cancelled cleanly".to_string())
        });
        token.cancel();
        assert_eq!(finish(&control).await.stdout, "cancelled cleanly");

        let control = spawn_task(id("t2"), CancellationToken::new(), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        });
        let ControlTarget::Task { abort, .. } = &control.target else {
            panic!("expected a task control");
        };
        abort.abort();
        assert_eq!(finish(&control).await.exit_code, exit_codes::KILLED);
    }
}
