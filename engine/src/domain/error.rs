// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Domain-level errors
//! Misuse errors are returned before any registry mutation; everything else
//! describes what happened to a unit of work.

use std::time::Duration;

use thiserror::Error;

use super::value_objects::ProcessStatus;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // Registry errors
    #[error("Handle '{0}' already exists")]
    DuplicateHandle(String),

    #[error("Handle '{0}' not found")]
    HandleNotFound(String),

    #[error("Handle '{0}' is still active")]
    HandleActive(String),

    #[error("Handle '{0}' has no live control reference")]
    ControlLost(String),

    #[error("Invalid state transition for '{handle_id}' from {from} to {to}")]
    InvalidStateTransition {
        handle_id: String,
        from: ProcessStatus,
        to: ProcessStatus,
    },

    // Launch and execution errors
    #[error("Failed to launch '{description}': {reason}")]
    LaunchFailure { description: String, reason: String },

    #[error("'{description}' timed out after {timeout:?}")]
    TimeoutExceeded {
        description: String,
        timeout: Duration,
    },

    #[error("'{description}' exited with code {exit_code}")]
    CommandFailed {
        description: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Worker '{function}' failed: {message}")]
    WorkerFailed { function: String, message: String },

    #[error("Failed to signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    // Validation errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Persistence errors
    #[error("Registry file {path} is unusable: {reason}")]
    PersistenceWarning { path: String, reason: String },

    #[error("Failed to persist registry: {0}")]
    Persistence(String),
}

impl DomainError {
    pub fn launch_failure(description: impl Into<String>, reason: impl ToString) -> Self {
        DomainError::LaunchFailure {
            description: description.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors caused by the caller; these never mutate the registry.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            DomainError::DuplicateHandle(_)
                | DomainError::HandleNotFound(_)
                | DomainError::HandleActive(_)
                | DomainError::InvalidArgument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
