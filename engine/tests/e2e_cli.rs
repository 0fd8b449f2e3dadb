// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

/// E2E tests for the `upm` command line
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn upm(state_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_upm"))
        .args(args)
        .env("UPM_STATE_DIR", state_dir)
        .env("UPM_STOP_GRACE_SEC", "1")
        .env("UPM_LOG_LEVEL", "warn")
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .env_remove("UPM_CONFIG")
        .env_remove("UPM_REGISTRY_FILE")
        .env_remove("UPM_LOGS_DIR")
        .env_remove("UPM_WORKER_PROGRAM")
        .output()
        .expect("Failed to run upm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_e2e_cli_run_passes_exit_code_through() {
    let dir = TempDir::new().unwrap();

    let output = upm(dir.path(), &["run", "--", "sh", "-c", "echo hi; exit 3"]);

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout(&output), "hi\n");
    // Blocking runs leave no registry behind.
    assert!(!dir.path().join("processes.json").exists());
}

#[test]
fn test_e2e_cli_start_status_stop() {
    let dir = TempDir::new().unwrap();

    let started = upm(dir.path(), &["start", "--id", "c1", "--", "sleep", "30"]);
    assert!(started.status.success(), "start failed: {started:?}");
    assert!(stdout(&started).contains("Started c1"));

    let status = upm(dir.path(), &["status", "c1"]);
    assert_eq!(stdout(&status).trim(), "running");

    let listed = upm(dir.path(), &["list", "--json"]);
    let handles: Value = serde_json::from_slice(&listed.stdout).unwrap();
    assert_eq!(handles[0]["handle_id"], "c1");

    let stopped = upm(dir.path(), &["stop", "c1"]);
    assert!(stopped.status.success(), "stop failed: {stopped:?}");
    let status = upm(dir.path(), &["status", "c1"]);
    assert_eq!(stdout(&status).trim(), "stopped");

    let again = upm(dir.path(), &["stop", "c1"]);
    assert!(stdout(&again).contains("already finished"));
}

#[test]
fn test_e2e_cli_worker_run() {
    let dir = TempDir::new().unwrap();

    let output = upm(dir.path(), &["worker", "run", "echo", "--args", r#"{"x": 1}"#]);

    assert!(output.status.success(), "worker run failed: {output:?}");
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["x"], 1);
}

#[test]
fn test_e2e_cli_worker_failure_exits_nonzero() {
    let dir = TempDir::new().unwrap();

    let output = upm(dir.path(), &["worker", "run", "fail", "--args", r#"{"message": "bad input"}"#]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bad input"));
}

#[test]
fn test_e2e_cli_unknown_handle() {
    let dir = TempDir::new().unwrap();

    let output = upm(dir.path(), &["status", "ghost"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn test_e2e_cli_info_json() {
    let dir = TempDir::new().unwrap();

    let output = upm(dir.path(), &["info", "--json"]);

    assert!(output.status.success());
    let info: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["total"], 0);
    assert_eq!(info["worker_pool_capacity"], 4);
}
