// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Shared helpers for the end-to-end tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use upm_engine::domain::ports::ProcessProbe;
use upm_engine::infrastructure::SystemProbe;
use upm_engine::{ManagerConfig, ProcessManager};

/// A manager over a throwaway state directory. Keep it alive for the whole
/// test; dropping it deletes the registry file.
pub struct TestManager {
    pub manager: ProcessManager,
    pub dir: TempDir,
}

impl TestManager {
    pub fn state_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn registry_path(&self) -> PathBuf {
        config_for(self.dir.path()).registry_path()
    }

    /// A second manager over the same state, as after a restart.
    pub async fn reopen(&self) -> ProcessManager {
        open(config_for(self.dir.path())).await
    }
}

/// One-second grace period and the `upm` binary as the worker program.
pub fn config_for(state_dir: &Path) -> ManagerConfig {
    let mut config = ManagerConfig::with_state_dir(state_dir);
    config.stop_grace_period_sec = 1;
    config.worker_program = Some(PathBuf::from(env!("CARGO_BIN_EXE_upm")));
    config
}

pub async fn open(config: ManagerConfig) -> ProcessManager {
    ProcessManager::open(config)
        .await
        .expect("Failed to open process manager")
}

pub async fn setup() -> TestManager {
    setup_with(|_| {}).await
}

pub async fn setup_with(adjust: impl FnOnce(&mut ManagerConfig)) -> TestManager {
    let dir = TempDir::new().expect("Failed to create state directory");
    let mut config = config_for(dir.path());
    adjust(&mut config);
    TestManager {
        manager: open(config).await,
        dir,
    }
}

pub fn unique_id(prefix: &str) -> String {
    format!("{prefix}-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Zombies count as gone; orphans may wait a while for init to reap them.
pub fn pid_is_alive(pid: u32) -> bool {
    SystemProbe.is_alive(pid)
}

/// Polls until `pid` is gone (reaped). Returns false on timeout.
pub async fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while pid_is_alive(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}
