// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use upm_engine::{ProcessKind, ProcessStatus};

#[derive(Parser, Debug)]
#[command(name = "upm", version)]
#[command(about = "Run and track external commands, worker functions and tasks")]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "UPM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command to completion and print its output
    Run {
        /// Kill the command after this many seconds
        #[arg(long, value_parser = parse_secs)]
        timeout: Option<Duration>,

        #[command(flatten)]
        launch: LaunchArgs,
    },

    /// Start a command in the background
    Start {
        #[arg(long)]
        id: Option<String>,

        #[command(flatten)]
        log: LogArgs,

        #[command(flatten)]
        launch: LaunchArgs,
    },

    /// Worker functions
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },

    /// List handles
    ///
    /// Each invocation is a fresh process. A background unit that exits
    /// between invocations is no longer watched, so it shows as failed with
    /// exit code -1 whatever code it returned. Only `upm run` reports the
    /// real exit code.
    List {
        #[arg(long)]
        kind: Option<ProcessKind>,

        #[arg(long)]
        status: Option<ProcessStatus>,

        #[arg(long)]
        json: bool,
    },

    /// Print the status of a handle
    ///
    /// Each invocation is a fresh process. A background unit that exits
    /// between invocations is no longer watched, so it shows as failed with
    /// exit code -1 whatever code it returned. Only `upm run` reports the
    /// real exit code.
    Status { id: String },

    /// Print a handle as JSON
    Show { id: String },

    /// Stop a handle, escalating to a kill after the grace period
    Stop {
        id: String,

        /// Kill immediately
        #[arg(long)]
        force: bool,
    },

    /// Wait for a handle to finish; exits with its exit code
    Wait {
        id: String,

        #[arg(long, value_parser = parse_secs)]
        timeout: Option<Duration>,
    },

    /// Reconcile with the OS and drop finished handles already seen
    Cleanup,

    /// Drop a finished handle
    Remove { id: String },

    /// Kill everything still running and empty the registry
    Reset,

    /// Registry location and counts
    Info {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    /// Run a worker function to completion and print its JSON result
    Run {
        name: String,

        /// JSON arguments
        #[arg(long, default_value = "null", value_parser = parse_json)]
        args: Value,

        #[arg(long, value_parser = parse_secs)]
        timeout: Option<Duration>,
    },

    /// Start a worker function in the background
    Start {
        name: String,

        #[arg(long, default_value = "null", value_parser = parse_json)]
        args: Value,

        #[arg(long)]
        id: Option<String>,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Registered worker function names
    List,
}

#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Working directory
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Extra environment entry (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Append stdout and stderr to this file
    #[arg(long, conflicts_with = "default_log")]
    pub log: Option<PathBuf>,

    /// Log to `<logs_dir>/<id>.log`
    #[arg(long)]
    pub default_log: bool,
}

fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw.parse().map_err(|_| format!("'{raw}' is not a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("timeout must be positive".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("'{raw}' is not KEY=VALUE")),
    }
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}
