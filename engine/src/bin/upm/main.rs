// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! `upm`, the unified process manager command line.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use upm_engine::infrastructure::logging;
use upm_engine::{ManagerConfig, WorkerRegistry, run_if_worker};

mod cli;
mod commands;
mod formatters;

use cli::Cli;

fn main() -> ExitCode {
    // Worker children re-enter through here before any argument parsing.
    if let Some(code) = run_if_worker(&WorkerRegistry::with_builtins()) {
        return code;
    }

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = ManagerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    logging::init_logging(level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(commands::execute(cli.command, config))
}
