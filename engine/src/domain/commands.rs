// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Launch requests
//! Input types for the run/start operations of the manager.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::entities::ProcessHandle;
use crate::domain::value_objects::{ProcessKind, ProcessStatus};
use crate::domain::{DomainError, Result};

/// An external command, run blocking or started in the background.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandRequest {
    pub args: Vec<String>,
    pub handle_id: Option<String>,
    pub log_file: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_handle_id(mut self, handle_id: impl Into<String>) -> Self {
        self.handle_id = Some(handle_id.into());
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command line as shown in handle descriptions.
    pub fn description(&self) -> String {
        self.args.join(" ")
    }

    pub fn validate(&self) -> Result<()> {
        match self.args.first() {
            None => Err(DomainError::InvalidArgument(
                "command arguments cannot be empty".to_string(),
            )),
            Some(program) if program.trim().is_empty() => Err(DomainError::InvalidArgument(
                "command program cannot be blank".to_string(),
            )),
            _ => validate_timeout(self.timeout),
        }
    }
}

/// A registered worker function, run blocking or started in the background.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRequest {
    pub function: String,
    pub args: serde_json::Value,
    pub handle_id: Option<String>,
    pub log_file: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl WorkerRequest {
    pub fn new(function: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            function: function.into(),
            args,
            handle_id: None,
            log_file: None,
            timeout: None,
        }
    }

    pub fn with_handle_id(mut self, handle_id: impl Into<String>) -> Self {
        self.handle_id = Some(handle_id.into());
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.function.trim().is_empty() {
            return Err(DomainError::InvalidArgument(
                "worker function name cannot be empty".to_string(),
            ));
        }
        validate_timeout(self.timeout)
    }
}

/// Optional kind/status filter for `list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub kind: Option<ProcessKind>,
    pub status: Option<ProcessStatus>,
}

impl ListFilter {
    pub fn kind(kind: ProcessKind) -> Self {
        Self {
            kind: Some(kind),
            status: None,
        }
    }

    pub fn status(status: ProcessStatus) -> Self {
        Self {
            kind: None,
            status: Some(status),
        }
    }

    pub fn matches(&self, handle: &ProcessHandle) -> bool {
        self.kind.is_none_or(|kind| handle.kind() == kind)
            && self.status.is_none_or(|status| handle.status() == status)
    }
}

fn validate_timeout(timeout: Option<Duration>) -> Result<()> {
    match timeout {
        Some(t) if t.is_zero() => Err(DomainError::InvalidArgument(
            "timeout must be positive".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_request_builder() {
        let req = CommandRequest::new(["sleep", "2"])
            .with_handle_id("t1")
            .with_env("A", "1")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(req.description(), "sleep 2");
        assert_eq!(req.handle_id.as_deref(), Some("t1"));
        assert_eq!(req.environment.get("A").map(String::as_str), Some("1"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_empty_command_rejected() {
        let req = CommandRequest::new(Vec::<String>::new());
        assert!(matches!(req.validate(), Err(DomainError::InvalidArgument(_))));
        let req = CommandRequest::new([""]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let req = CommandRequest::new(["true"]).with_timeout(Duration::ZERO);
        assert!(req.validate().is_err());
        let req = WorkerRequest::new("echo", serde_json::json!({})).with_timeout(Duration::ZERO);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_list_filter() {
        let handle = ProcessHandle::builder(
            crate::domain::value_objects::HandleId::new("f").unwrap(),
            ProcessKind::CooperativeTask,
            "tick",
        )
        .build()
        .unwrap();
        assert!(ListFilter::default().matches(&handle));
        assert!(ListFilter::kind(ProcessKind::CooperativeTask).matches(&handle));
        assert!(!ListFilter::kind(ProcessKind::ExternalCommand).matches(&handle));
        assert!(ListFilter::status(ProcessStatus::Starting).matches(&handle));
        let both = ListFilter {
            kind: Some(ProcessKind::CooperativeTask),
            status: Some(ProcessStatus::Running),
        };
        assert!(!both.matches(&handle));
    }

    #[test]
    fn test_worker_name_required() {
        let req = WorkerRequest::new(" ", serde_json::Value::Null);
        assert!(req.validate().is_err());
    }
}
