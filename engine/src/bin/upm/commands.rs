// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use colored::Colorize;
use upm_engine::{
    CommandRequest, HandleId, ListFilter, ManagerConfig, ProcessKind, ProcessManager,
    WorkerRequest,
};

use crate::cli::{Command, LaunchArgs, LogArgs, WorkerCommand};
use crate::formatters;

pub async fn execute(command: Command, config: ManagerConfig) -> anyhow::Result<ExitCode> {
    match command {
        // Blocking runs are never registered.
        Command::Run { timeout, launch } => {
            let manager = ProcessManager::in_memory(config).await?;
            let mut request = command_request(launch);
            request.timeout = timeout;
            let result = manager.run_external(&request).await?;
            print!("{}", result.stdout());
            eprint!("{}", result.stderr());
            if result.timed_out() {
                eprintln!("{} timed out after {:?}", "upm:".yellow(), timeout.unwrap_or_default());
            }
            Ok(exit_code(result.exit_code()))
        }
        Command::Worker {
            command: WorkerCommand::Run { name, args, timeout },
        } => {
            let manager = ProcessManager::in_memory(config).await?;
            let mut request = WorkerRequest::new(name, args);
            request.timeout = timeout;
            let value = manager.run_worker(&request).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Worker {
            command: WorkerCommand::List,
        } => {
            let manager = ProcessManager::in_memory(config).await?;
            for name in manager.workers().names() {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let manager = ProcessManager::open(config)
                .await
                .context("Failed to open the process registry")?;
            let code = execute_managed(&manager, command).await;
            manager.save().await.context("Failed to save the process registry")?;
            code
        }
    }
}

async fn execute_managed(manager: &ProcessManager, command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Start { id, log, launch } => {
            let id = resolve_id(id, ProcessKind::ExternalCommand)?;
            let mut request = command_request(launch).with_handle_id(id.as_str());
            request.log_file = log_file(manager, &log, &id);
            let handle = manager.start_external_background(&request).await?;
            formatters::print_started(&handle);
        }
        Command::Worker {
            command: WorkerCommand::Start { name, args, id, log },
        } => {
            let id = resolve_id(id, ProcessKind::WorkerFunction)?;
            let mut request = WorkerRequest::new(name, args).with_handle_id(id.as_str());
            request.log_file = log_file(manager, &log, &id);
            let handle = manager.start_worker_background(&request).await?;
            formatters::print_started(&handle);
        }
        Command::List { kind, status, json } => {
            let handles = manager.list(ListFilter { kind, status }).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&handles)?);
            } else {
                formatters::print_handles(&mut std::io::stdout(), &handles)?;
            }
        }
        Command::Status { id } => {
            let status = manager.status(&id).await?;
            println!("{}", formatters::colored_status(status));
        }
        Command::Show { id } => {
            let handle = manager
                .get(&id)
                .await
                .with_context(|| format!("Handle '{id}' not found"))?;
            println!("{}", serde_json::to_string_pretty(&handle)?);
        }
        Command::Stop { id, force } => {
            if manager.stop(&id, force).await? {
                let status = manager.status(&id).await?;
                println!("{id}: {}", formatters::colored_status(status));
            } else {
                println!("{id}: already finished");
            }
        }
        Command::Wait { id, timeout } => {
            let result = manager.wait(&id, timeout).await?;
            formatters::print_result(&result);
            return Ok(exit_code(result.exit_code()));
        }
        Command::Cleanup => {
            let reconciled = manager.cleanup_dead().await;
            println!("Reconciled {reconciled} handle(s)");
        }
        Command::Remove { id } => {
            manager.remove(&id).await?;
            println!("Removed {id}");
        }
        Command::Reset => {
            let removed = manager.reset().await?;
            println!("Removed {removed} handle(s)");
        }
        Command::Info { json } => {
            let info = manager.registry_info().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                formatters::print_info(&mut std::io::stdout(), &info)?;
            }
        }
        other => anyhow::bail!("{other:?} does not use the process registry"),
    }
    std::io::stdout().flush()?;
    Ok(ExitCode::SUCCESS)
}

fn command_request(launch: LaunchArgs) -> CommandRequest {
    let mut request = CommandRequest::new(launch.args);
    request.working_directory = launch.cwd;
    request.environment.extend(launch.env);
    request
}

// Default log paths are named after the handle, so the id is fixed up front.
fn resolve_id(requested: Option<String>, kind: ProcessKind) -> anyhow::Result<HandleId> {
    Ok(HandleId::resolve(requested.as_deref(), kind)?)
}

fn log_file(manager: &ProcessManager, log: &LogArgs, id: &HandleId) -> Option<PathBuf> {
    if log.default_log {
        return Some(manager.config().default_log_file(id));
    }
    log.log.clone()
}

/// Exit codes outside `0..=255` (unknown, negative) map to 1.
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
