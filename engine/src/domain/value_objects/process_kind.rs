// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// The three ways a unit of work can be realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// Independent OS process running a command line.
    ExternalCommand,
    /// Independent OS process running a registered worker function.
    WorkerFunction,
    /// Future scheduled on the manager's own runtime.
    CooperativeTask,
}

impl ProcessKind {
    /// Whether units of this kind are backed by an OS process id.
    pub fn has_os_process(self) -> bool {
        !matches!(self, ProcessKind::CooperativeTask)
    }

    /// Prefix used for generated handle ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            ProcessKind::ExternalCommand => "cmd",
            ProcessKind::WorkerFunction => "worker",
            ProcessKind::CooperativeTask => "task",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::ExternalCommand => write!(f, "external_command"),
            ProcessKind::WorkerFunction => write!(f, "worker_function"),
            ProcessKind::CooperativeTask => write!(f, "cooperative_task"),
        }
    }
}

impl FromStr for ProcessKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "external_command" | "command" | "cmd" => Ok(ProcessKind::ExternalCommand),
            "worker_function" | "worker" => Ok(ProcessKind::WorkerFunction),
            "cooperative_task" | "task" => Ok(ProcessKind::CooperativeTask),
            other => Err(DomainError::InvalidArgument(format!("unknown kind '{other}'"))),
        }
    }
}
