// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! ProcessHandle entity
//! Identity plus metadata of one managed unit of work. Status changes go
//! through the `mark_*` methods, which enforce the transition table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{HandleId, ProcessKind, ProcessStatus};
use crate::domain::{DomainError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessHandle {
    handle_id: HandleId,
    kind: ProcessKind,
    created_at: DateTime<Utc>,
    description: String,
    #[serde(default)]
    os_process_id: Option<u32>,
    #[serde(default)]
    log_file: Option<PathBuf>,
    #[serde(default)]
    working_directory: Option<PathBuf>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    status: ProcessStatus,
    #[serde(default)]
    exit_code: Option<i32>,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    terminal_observed: bool,
}

impl ProcessHandle {
    pub fn builder(
        handle_id: HandleId,
        kind: ProcessKind,
        description: impl Into<String>,
    ) -> ProcessHandleBuilder {
        ProcessHandleBuilder {
            handle_id,
            kind,
            description: description.into(),
            log_file: None,
            working_directory: None,
            environment: BTreeMap::new(),
        }
    }

    // Getters

    pub fn handle_id(&self) -> &HandleId {
        &self.handle_id
    }

    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn os_process_id(&self) -> Option<u32> {
        self.os_process_id
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// A caller has seen this handle in a terminal state.
    pub fn is_terminal_observed(&self) -> bool {
        self.terminal_observed
    }

    /// Time between creation and the latest transition.
    pub fn elapsed(&self) -> Duration {
        (self.last_updated - self.created_at)
            .to_std()
            .unwrap_or_default()
    }

    // Transitions

    pub(crate) fn mark_running(&mut self, pid: Option<u32>) -> Result<()> {
        if pid.is_some() && !self.kind.has_os_process() {
            return Err(DomainError::InvalidArgument(format!(
                "{} '{}' cannot carry an OS process id",
                self.kind, self.handle_id
            )));
        }
        self.transition(ProcessStatus::Running)?;
        if pid.is_some() {
            self.os_process_id = pid;
        }
        Ok(())
    }

    pub(crate) fn mark_stopping(&mut self) -> Result<()> {
        self.transition(ProcessStatus::Stopping)
    }

    pub(crate) fn mark_stopped(&mut self, exit_code: i32) -> Result<()> {
        self.transition(ProcessStatus::Stopped)?;
        self.exit_code = Some(exit_code);
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self, exit_code: i32) -> Result<()> {
        self.transition(ProcessStatus::Failed)?;
        self.exit_code = Some(exit_code);
        Ok(())
    }

    pub(crate) fn mark_unknown(&mut self) -> Result<()> {
        self.transition(ProcessStatus::Unknown)
    }

    /// Returns true the first time a terminal handle is observed.
    pub(crate) fn mark_observed(&mut self) -> bool {
        if self.status.is_terminal() && !self.terminal_observed {
            self.terminal_observed = true;
            return true;
        }
        false
    }

    fn transition(&mut self, next: ProcessStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                handle_id: self.handle_id.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Checks the invariants a deserialized record must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::InvalidArgument(format!(
                "handle '{}' has an empty description",
                self.handle_id
            )));
        }
        if self.os_process_id.is_some() && !self.kind.has_os_process() {
            return Err(DomainError::InvalidArgument(format!(
                "{} '{}' cannot carry an OS process id",
                self.kind, self.handle_id
            )));
        }
        match (self.status.is_terminal(), self.exit_code) {
            (true, None) => Err(DomainError::InvalidArgument(format!(
                "terminal handle '{}' has no exit code",
                self.handle_id
            ))),
            (false, Some(_)) => Err(DomainError::InvalidArgument(format!(
                "non-terminal handle '{}' has an exit code",
                self.handle_id
            ))),
            _ => Ok(()),
        }
    }
}

pub struct ProcessHandleBuilder {
    handle_id: HandleId,
    kind: ProcessKind,
    description: String,
    log_file: Option<PathBuf>,
    working_directory: Option<PathBuf>,
    environment: BTreeMap<String, String>,
}

impl ProcessHandleBuilder {
    pub fn log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    pub fn working_directory(mut self, working_directory: Option<PathBuf>) -> Self {
        self.working_directory = working_directory;
        self
    }

    pub fn environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// New handles start in `Starting`.
    pub fn build(self) -> Result<ProcessHandle> {
        if self.description.trim().is_empty() {
            return Err(DomainError::InvalidArgument(
                "description cannot be empty".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(ProcessHandle {
            handle_id: self.handle_id,
            kind: self.kind,
            created_at: now,
            description: self.description,
            os_process_id: None,
            log_file: self.log_file,
            working_directory: self.working_directory,
            environment: self.environment,
            status: ProcessStatus::Starting,
            exit_code: None,
            last_updated: now,
            terminal_observed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(kind: ProcessKind) -> ProcessHandle {
        ProcessHandle::builder(HandleId::new("h1").unwrap(), kind, "sleep 2")
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_handle_is_starting() {
        let h = handle(ProcessKind::ExternalCommand);
        assert_eq!(h.status(), ProcessStatus::Starting);
        assert_eq!(h.exit_code(), None);
        assert_eq!(h.os_process_id(), None);
        assert_eq!(h.created_at(), h.last_updated());
    }

    #[test]
    fn test_empty_description_rejected() {
        let result =
            ProcessHandle::builder(HandleId::new("h1").unwrap(), ProcessKind::ExternalCommand, " ")
                .build();
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
    }

    #[test]
    fn test_running_records_pid() {
        let mut h = handle(ProcessKind::ExternalCommand);
        h.mark_running(Some(4242)).unwrap();
        assert_eq!(h.status(), ProcessStatus::Running);
        assert_eq!(h.os_process_id(), Some(4242));
    }

    #[test]
    fn test_task_cannot_carry_pid() {
        let mut h = handle(ProcessKind::CooperativeTask);
        assert!(h.mark_running(Some(1)).is_err());
        assert_eq!(h.status(), ProcessStatus::Starting);
        h.mark_running(None).unwrap();
        assert_eq!(h.os_process_id(), None);
    }

    #[test]
    fn test_exit_code_set_only_when_terminal() {
        let mut h = handle(ProcessKind::ExternalCommand);
        h.mark_running(Some(1)).unwrap();
        h.mark_stopping().unwrap();
        assert_eq!(h.exit_code(), None);
        h.mark_stopped(143).unwrap();
        assert_eq!(h.exit_code(), Some(143));
        assert!(h.validate().is_ok());
    }

    #[test]
    fn test_invalid_transition_leaves_handle_unchanged() {
        let mut h = handle(ProcessKind::ExternalCommand);
        h.mark_running(Some(1)).unwrap();
        h.mark_failed(2).unwrap();
        let before = h.clone();

        let err = h.mark_stopped(0).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert_eq!(h, before);
    }

    #[test]
    fn test_unknown_has_no_exit_code() {
        let mut h = handle(ProcessKind::CooperativeTask);
        h.mark_running(None).unwrap();
        h.mark_unknown().unwrap();
        assert_eq!(h.status(), ProcessStatus::Unknown);
        assert_eq!(h.exit_code(), None);
        assert!(h.mark_stopping().is_err());
    }

    #[test]
    fn test_observed_only_for_terminal() {
        let mut h = handle(ProcessKind::ExternalCommand);
        h.mark_running(Some(1)).unwrap();
        assert!(!h.mark_observed());
        h.mark_stopped(0).unwrap();
        assert!(h.mark_observed());
        assert!(!h.mark_observed());
        assert!(h.is_terminal_observed());
    }

    #[test]
    fn test_validate_rejects_inconsistent_records() {
        let mut h = handle(ProcessKind::ExternalCommand);
        h.status = ProcessStatus::Failed;
        assert!(h.validate().is_err());

        let mut h = handle(ProcessKind::CooperativeTask);
        h.os_process_id = Some(7);
        assert!(h.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip_keeps_metadata() {
        let mut env = BTreeMap::new();
        env.insert("MODE".to_string(), "tail".to_string());
        let mut h = ProcessHandle::builder(
            HandleId::new("streamer").unwrap(),
            ProcessKind::WorkerFunction,
            "log_streamer",
        )
        .log_file(Some(PathBuf::from("/tmp/streamer.log")))
        .working_directory(Some(PathBuf::from("/tmp")))
        .environment(env)
        .build()
        .unwrap();
        h.mark_running(Some(31337)).unwrap();

        let json = serde_json::to_string(&h).unwrap();
        let back: ProcessHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
        assert_eq!(back.os_process_id(), Some(31337));
    }
}
