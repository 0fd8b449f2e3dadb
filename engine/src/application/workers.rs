// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Worker functions
//!
//! A worker function runs in its own OS process: the worker program is
//! re-executed as `<program> __upm-worker <name> <args-json>`, runs the named
//! function and prints its JSON result as one line on stdout. Programs that
//! host workers call [`run_if_worker`] first thing in `main`.

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde_json::{Value, json};

use crate::constants::worker::{ENTRYPOINT_ARG, UNKNOWN_FUNCTION_EXIT};
use crate::domain::{DomainError, Result};
use crate::infrastructure::logging;

const FAILURE_EXIT: u8 = 1;

pub type WorkerFn = fn(Value) -> anyhow::Result<Value>;

#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    functions: BTreeMap<String, WorkerFn>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `echo`, `sleep` and `fail`.
    pub fn with_builtins() -> Self {
        Self::new()
            .register("echo", builtin::echo)
            .register("sleep", builtin::sleep)
            .register("fail", builtin::fail)
    }

    pub fn register(mut self, name: impl Into<String>, function: WorkerFn) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<WorkerFn> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn invoke(&self, name: &str, args: Value) -> anyhow::Result<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| anyhow!("unknown worker function '{name}'"))?;
        function(args)
    }
}

/// Command-line arguments that make the worker program run `function`.
pub(crate) fn worker_args(function: &str, args: &Value) -> Result<Vec<String>> {
    let encoded = serde_json::to_string(args)
        .map_err(|e| DomainError::InvalidArgument(format!("worker args: {e}")))?;
    Ok(vec![
        ENTRYPOINT_ARG.to_string(),
        function.to_string(),
        encoded,
    ])
}

/// Last non-empty stdout line, parsed as JSON.
pub(crate) fn decode_worker_output(stdout: &str) -> std::result::Result<Value, String> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| "worker produced no result".to_string())?;
    serde_json::from_str(line).map_err(|e| format!("invalid worker result: {e}"))
}

/// Runs the worker child protocol when this process was launched as a
/// worker, and returns the exit code to finish with. `None` otherwise.
pub fn run_if_worker(registry: &WorkerRegistry) -> Option<ExitCode> {
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() != Some(ENTRYPOINT_ARG) {
        return None;
    }
    let level = std::env::var("UPM_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    logging::init_logging(&level);
    Some(ExitCode::from(run_worker_child(registry, args.collect())))
}

fn run_worker_child(registry: &WorkerRegistry, args: Vec<String>) -> u8 {
    let Some(name) = args.first() else {
        eprintln!("usage: {ENTRYPOINT_ARG} <function> [args-json]");
        return UNKNOWN_FUNCTION_EXIT;
    };
    if !registry.contains(name) {
        eprintln!("unknown worker function '{name}'");
        return UNKNOWN_FUNCTION_EXIT;
    }

    let input = match args.get(1) {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                eprintln!("invalid worker args: {e}");
                return FAILURE_EXIT;
            }
        },
        None => Value::Null,
    };

    match registry.invoke(name, input) {
        Ok(value) => {
            println!("{value}");
            0
        }
        Err(e) => {
            eprintln!("{e:#}");
            FAILURE_EXIT
        }
    }
}

mod builtin {
    use super::*;

    pub fn echo(args: Value) -> anyhow::Result<Value> {
        Ok(args)
    }

    /// `{"secs": f64}`
    pub fn sleep(args: Value) -> anyhow::Result<Value> {
        let secs = args
            .get("secs")
            .and_then(Value::as_f64)
            .context("sleep expects a numeric 'secs' argument")?;
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("sleep duration must be a non-negative number");
        }
        std::thread::sleep(Duration::from_secs_f64(secs));
        Ok(json!({ "slept": secs }))
    }

    /// `{"message": str}`
    pub fn fail(args: Value) -> anyhow::Result<Value> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("worker failed on request");
        Err(anyhow!("{message}"))
    }
}
