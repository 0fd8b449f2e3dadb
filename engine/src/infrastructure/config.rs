// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Manager configuration
//!
//! Defaults, optionally overlaid by a YAML file, then by `UPM_*` environment
//! variables.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{lifecycle, persistence};
use crate::domain::value_objects::HandleId;
use crate::domain::{DomainError, Result};

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Root of the tool's local state.
    pub state_dir: PathBuf,
    /// Registry document; `<state_dir>/processes.json` when unset.
    pub registry_file: Option<PathBuf>,
    /// Conventional log location; `<state_dir>/logs` when unset.
    pub logs_dir: Option<PathBuf>,
    pub stop_grace_period_sec: u64,
    pub worker_pool_size: usize,
    /// Program re-executed for worker functions; the current executable when unset.
    pub worker_program: Option<PathBuf>,
    pub reconcile_on_load: bool,
    pub log_level: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            registry_file: None,
            logs_dir: None,
            stop_grace_period_sec: lifecycle::DEFAULT_STOP_GRACE_PERIOD_SEC,
            worker_pool_size: lifecycle::DEFAULT_WORKER_POOL_SIZE,
            worker_program: None,
            reconcile_on_load: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// `$HOME/.local/share/upm`, or `./.upm` without a home directory.
fn default_state_dir() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(persistence::STATE_DIR_NAME),
        _ => PathBuf::from(format!(".{}", persistence::STATE_DIR_NAME)),
    }
}

impl ManagerConfig {
    /// Defaults with every derived path rooted at `state_dir`.
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DomainError::InvalidArgument(format!("cannot read config {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            DomainError::InvalidArgument(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// File (if any), then environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(dir) = env::var_os("UPM_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(file) = env::var_os("UPM_REGISTRY_FILE") {
            self.registry_file = Some(PathBuf::from(file));
        }
        if let Some(dir) = env::var_os("UPM_LOGS_DIR") {
            self.logs_dir = Some(PathBuf::from(dir));
        }
        if let Some(program) = env::var_os("UPM_WORKER_PROGRAM") {
            self.worker_program = Some(PathBuf::from(program));
        }
        if let Some(secs) = parse_env("UPM_STOP_GRACE_SEC") {
            self.stop_grace_period_sec = secs;
        }
        if let Some(size) = parse_env("UPM_WORKER_POOL_SIZE") {
            self.worker_pool_size = size;
        }
        if let Some(flag) = parse_bool("UPM_RECONCILE_ON_LOAD") {
            self.reconcile_on_load = flag;
        }
        // Priority: UPM_LOG_LEVEL > RUST_LOG > file/default
        if let Ok(level) = env::var("UPM_LOG_LEVEL").or_else(|_| env::var("RUST_LOG")) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(DomainError::InvalidArgument(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.stop_grace_period_sec == 0 {
            return Err(DomainError::InvalidArgument(
                "stop_grace_period_sec must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.state_dir.join(persistence::REGISTRY_FILE_NAME))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.logs_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join(persistence::LOGS_DIR_NAME))
    }

    pub fn default_log_file(&self, handle_id: &HandleId) -> PathBuf {
        self.logs_dir().join(format!("{handle_id}.log"))
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.stop_grace_period_sec)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

fn parse_bool(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            warn!(variable = name, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}
