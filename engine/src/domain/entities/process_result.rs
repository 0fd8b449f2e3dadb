// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::time::Duration;

use serde::Serialize;

use super::ProcessHandle;
use crate::constants::exit_codes;
use crate::domain::{DomainError, Result};

/// What a finished run produced besides its exit code.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RunDetails {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    pub forced: bool,
}

/// Terminal snapshot of a completed unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessResult {
    handle: ProcessHandle,
    stdout: String,
    stderr: String,
    exit_code: i32,
    success: bool,
    duration: Duration,
    timed_out: bool,
    forced: bool,
}

impl ProcessResult {
    pub(crate) fn new(handle: ProcessHandle, details: RunDetails) -> Self {
        let exit_code = handle.exit_code().unwrap_or(exit_codes::UNKNOWN);
        Self {
            handle,
            stdout: details.stdout,
            stderr: details.stderr,
            exit_code,
            success: exit_code == exit_codes::SUCCESS && !details.timed_out,
            duration: details.duration,
            timed_out: details.timed_out,
            forced: details.forced,
        }
    }

    /// Result for a handle whose run details were not kept, e.g. one
    /// reloaded from disk.
    pub(crate) fn from_handle(handle: ProcessHandle) -> Self {
        let duration = handle.elapsed();
        Self::new(
            handle,
            RunDetails {
                duration,
                ..RunDetails::default()
            },
        )
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The run was killed because it exceeded its timeout.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Graceful termination was not honored and the unit was killed.
    pub fn forced(&self) -> bool {
        self.forced
    }

    /// Turns a failing result into the matching error.
    pub fn check(self) -> Result<Self> {
        if self.timed_out {
            return Err(DomainError::TimeoutExceeded {
                description: self.handle.description().to_string(),
                timeout: self.duration,
            });
        }
        if !self.success {
            return Err(DomainError::CommandFailed {
                description: self.handle.description().to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            });
        }
        Ok(self)
    }
}
