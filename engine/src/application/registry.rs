// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory registry
//!
//! Handles keyed by id, each paired with the live control reference of its
//! unit of work (never persisted). Exit monitors only publish outcomes on a
//! watch channel; the registry applies them when the handle is next read.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::constants::exit_codes;
use crate::domain::entities::{ProcessHandle, ProcessResult, RunDetails};
use crate::domain::services::ReconciliationService;
use crate::domain::value_objects::{HandleId, ProcessStatus};
use crate::domain::{DomainError, ListFilter, Result};

/// How a unit of work ended, as seen by its exit monitor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExitOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

pub(crate) type ExitReceiver = watch::Receiver<Option<ExitOutcome>>;

#[derive(Debug, Clone)]
pub(crate) enum ControlTarget {
    OsProcess {
        pid: u32,
    },
    Task {
        cancel: CancellationToken,
        abort: AbortHandle,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct LiveControl {
    pub target: ControlTarget,
    pub exit: ExitReceiver,
}

impl LiveControl {
    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.exit.borrow().clone()
    }
}

pub(crate) struct RegistryEntry {
    pub handle: ProcessHandle,
    pub control: Option<LiveControl>,
    pub details: Option<RunDetails>,
    seq: u64,
}

impl RegistryEntry {
    /// Applies a published exit outcome. Returns true if the status changed.
    pub fn settle(&mut self, forced: bool) -> Result<bool> {
        if self.handle.status().is_settled() {
            return Ok(false);
        }
        let Some(outcome) = self.control.as_ref().and_then(LiveControl::outcome) else {
            return Ok(false);
        };
        self.apply(outcome, forced)?;
        Ok(true)
    }

    /// After a stop request every outcome ends `Stopped`; otherwise only a
    /// zero exit does.
    pub fn apply(&mut self, outcome: ExitOutcome, forced: bool) -> Result<()> {
        let stop_requested = self.handle.status() == ProcessStatus::Stopping;
        if stop_requested || outcome.exit_code == exit_codes::SUCCESS {
            self.handle.mark_stopped(outcome.exit_code)?;
        } else {
            self.handle.mark_failed(outcome.exit_code)?;
        }
        info!(
            handle_id = %self.handle.handle_id(),
            status = %self.handle.status(),
            exit_code = outcome.exit_code,
            forced,
            "Unit of work finished"
        );
        self.details = Some(RunDetails {
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            duration: outcome.elapsed,
            timed_out: false,
            forced,
        });
        self.control = None;
        Ok(())
    }

    pub fn result(&self) -> ProcessResult {
        match &self.details {
            Some(details) => ProcessResult::new(self.handle.clone(), details.clone()),
            None => ProcessResult::from_handle(self.handle.clone()),
        }
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<HandleId, RegistryEntry>,
    next_seq: u64,
}

pub(crate) type SharedRegistry = Mutex<Registry>;

pub(crate) fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    /// Rebuilds the registry from persisted records, keeping file order.
    pub fn from_handles(handles: Vec<ProcessHandle>) -> Self {
        let mut registry = Self::default();
        for handle in handles {
            let id = handle.handle_id().clone();
            if registry.insert(handle, None).is_err() {
                warn!(handle_id = %id, "Duplicate handle in registry file, keeping the first");
            }
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.handle.status().is_active())
            .count()
    }

    pub fn ensure_available(&self, id: &HandleId) -> Result<()> {
        if self.entries.contains_key(id) {
            return Err(DomainError::DuplicateHandle(id.to_string()));
        }
        Ok(())
    }

    pub fn insert(&mut self, handle: ProcessHandle, control: Option<LiveControl>) -> Result<()> {
        self.ensure_available(handle.handle_id())?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            handle.handle_id().clone(),
            RegistryEntry {
                handle,
                control,
                details: None,
                seq,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&RegistryEntry> {
        self.entries
            .get(id)
            .ok_or_else(|| DomainError::HandleNotFound(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut RegistryEntry> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| DomainError::HandleNotFound(id.to_string()))
    }

    /// Settles `id` and, if terminal, marks it observed. Returns a copy and
    /// whether anything changed.
    pub fn observe(&mut self, id: &str) -> Result<(ProcessHandle, bool)> {
        let entry = self.get_mut(id)?;
        let settled = entry.settle(false)?;
        let observed = entry.handle.mark_observed();
        Ok((entry.handle.clone(), settled || observed))
    }

    /// Applies every published outcome. Returns how many handles settled.
    pub fn settle_all(&mut self) -> usize {
        let mut settled = 0;
        for entry in self.entries.values_mut() {
            match entry.settle(false) {
                Ok(true) => settled += 1,
                Ok(false) => {}
                Err(e) => warn!(handle_id = %entry.handle.handle_id(), error = %e, "Failed to settle handle"),
            }
        }
        settled
    }

    /// Handles matching `filter` in creation order; terminal ones are marked
    /// observed.
    pub fn list(&mut self, filter: &ListFilter) -> (Vec<ProcessHandle>, bool) {
        let mut changed = self.settle_all() > 0;
        let mut matching: Vec<&mut RegistryEntry> = self
            .entries
            .values_mut()
            .filter(|e| filter.matches(&e.handle))
            .collect();
        matching.sort_by_key(|e| e.seq);
        let handles = matching
            .into_iter()
            .map(|entry| {
                changed |= entry.handle.mark_observed();
                entry.handle.clone()
            })
            .collect();
        (handles, changed)
    }

    /// Ids of handles satisfying `predicate`, in creation order.
    pub fn ids_where(&self, predicate: impl Fn(&RegistryEntry) -> bool) -> Vec<HandleId> {
        let mut selected: Vec<&RegistryEntry> =
            self.entries.values().filter(|e| predicate(e)).collect();
        selected.sort_by_key(|e| e.seq);
        selected
            .into_iter()
            .map(|e| e.handle.handle_id().clone())
            .collect()
    }

    /// Persistable copy in creation order.
    pub fn snapshot(&self) -> Vec<ProcessHandle> {
        let mut entries: Vec<&RegistryEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.handle.clone()).collect()
    }

    /// Settles pending outcomes, then reconciles every active handle without
    /// an exit monitor. OS handles are only probed when `probe_os` is set.
    /// Returns the number of handles moved to a settled state.
    pub fn reconcile(&mut self, reconciler: &ReconciliationService, probe_os: bool) -> usize {
        let mut moved = self.settle_all();
        for entry in self.entries.values_mut() {
            let live = entry.control.is_some();
            // A monitored unit reports its own exit.
            if live || (entry.handle.kind().has_os_process() && !probe_os) {
                continue;
            }
            match reconciler.reconcile(&mut entry.handle, live) {
                Ok(Some(_)) => {
                    entry.control = None;
                    moved += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(
                    handle_id = %entry.handle.handle_id(),
                    error = %e,
                    "Failed to reconcile handle"
                ),
            }
        }
        moved
    }

    /// Drops terminal handles a caller has already seen.
    pub fn remove_observed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.handle.is_terminal_observed());
        before - self.entries.len()
    }

    /// Explicit acknowledgement; active handles cannot be removed.
    pub fn remove(&mut self, id: &str) -> Result<ProcessHandle> {
        let entry = self.get_mut(id)?;
        entry.settle(false)?;
        if entry.handle.status().is_active() {
            return Err(DomainError::HandleActive(id.to_string()));
        }
        self.entries
            .remove(id)
            .map(|e| e.handle)
            .ok_or_else(|| DomainError::HandleNotFound(id.to_string()))
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockProcessProbe;
    use crate::domain::value_objects::ProcessKind;
    use std::sync::Arc;

    fn handle(id: &str, kind: ProcessKind) -> ProcessHandle {
        let mut handle = ProcessHandle::builder(HandleId::new(id).unwrap(), kind, "job")
            .build()
            .unwrap();
        handle
            .mark_running(kind.has_os_process().then_some(9000))
            .unwrap();
        handle
    }

    fn os_control() -> (watch::Sender<Option<ExitOutcome>>, LiveControl) {
        let (tx, rx) = watch::channel(None);
        (
            tx,
            LiveControl {
                target: ControlTarget::OsProcess { pid: 9000 },
                exit: rx,
            },
        )
    }

    fn outcome(exit_code: i32) -> Option<ExitOutcome> {
        Some(ExitOutcome {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::from_millis(5),
        })
    }

    #[test]
    fn test_duplicate_insert_leaves_existing_entry() {
        let mut registry = Registry::default();
        registry.insert(handle("a", ProcessKind::ExternalCommand), None).unwrap();

        let err = registry
            .insert(handle("a", ProcessKind::CooperativeTask), None)
            .unwrap_err();

        assert_eq!(err, DomainError::DuplicateHandle("a".into()));
        assert_eq!(registry.get("a").unwrap().handle.kind(), ProcessKind::ExternalCommand);
    }

    #[test]
    fn test_outcome_applied_on_observe() {
        let mut registry = Registry::default();
        let (tx, control) = os_control();
        registry
            .insert(handle("a", ProcessKind::ExternalCommand), Some(control))
            .unwrap();

        tx.send(outcome(0)).unwrap();
        // Publishing alone does not touch the handle.
        assert_eq!(registry.get("a").unwrap().handle.status(), ProcessStatus::Running);

        let (seen, changed) = registry.observe("a").unwrap();
        assert!(changed);
        assert_eq!(seen.status(), ProcessStatus::Stopped);
        assert_eq!(seen.exit_code(), Some(0));
        assert!(seen.is_terminal_observed());
        assert!(registry.get("a").unwrap().control.is_none());
    }

    #[test]
    fn test_nonzero_exit_fails_unless_stop_requested() {
        let mut registry = Registry::default();
        let (tx_a, control_a) = os_control();
        let (tx_b, control_b) = os_control();
        registry
            .insert(handle("a", ProcessKind::ExternalCommand), Some(control_a))
            .unwrap();
        registry
            .insert(handle("b", ProcessKind::ExternalCommand), Some(control_b))
            .unwrap();
        registry.get_mut("b").unwrap().handle.mark_stopping().unwrap();

        tx_a.send(outcome(137)).unwrap();
        tx_b.send(outcome(143)).unwrap();

        assert_eq!(registry.settle_all(), 2);
        assert_eq!(registry.get("a").unwrap().handle.status(), ProcessStatus::Failed);
        assert_eq!(registry.get("b").unwrap().handle.status(), ProcessStatus::Stopped);
        assert_eq!(registry.get("b").unwrap().handle.exit_code(), Some(143));
    }

    #[test]
    fn test_list_orders_by_creation_and_filters() {
        let mut registry = Registry::default();
        for (id, kind) in [
            ("zeta", ProcessKind::ExternalCommand),
            ("alpha", ProcessKind::CooperativeTask),
            ("mid", ProcessKind::ExternalCommand),
        ] {
            registry.insert(handle(id, kind), None).unwrap();
        }

        let (all, _) = registry.list(&ListFilter::default());
        let ids: Vec<&str> = all.iter().map(|h| h.handle_id().as_str()).collect();
        assert_eq!(ids, ["zeta", "alpha", "mid"]);

        let (cmds, _) = registry.list(&ListFilter::kind(ProcessKind::ExternalCommand));
        assert_eq!(cmds.len(), 2);
        let (stopped, _) = registry.list(&ListFilter::status(ProcessStatus::Stopped));
        assert!(stopped.is_empty());
    }

    #[test]
    fn test_reconcile_counts_and_removes_observed() {
        let mut probe = MockProcessProbe::new();
        probe.expect_is_alive().return_const(false);
        let reconciler = ReconciliationService::new(Arc::new(probe));

        let mut registry = Registry::from_handles(vec![
            handle("dead", ProcessKind::ExternalCommand),
            handle("task", ProcessKind::CooperativeTask),
        ]);

        assert_eq!(registry.reconcile(&reconciler, true), 2);
        assert_eq!(registry.get("dead").unwrap().handle.status(), ProcessStatus::Failed);
        assert_eq!(registry.get("task").unwrap().handle.status(), ProcessStatus::Unknown);

        // Nothing observed yet.
        assert_eq!(registry.remove_observed(), 0);
        registry.observe("dead").unwrap();
        assert_eq!(registry.remove_observed(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reconcile_skips_monitored_and_unprobed_handles() {
        let mut probe = MockProcessProbe::new();
        probe.expect_is_alive().never();
        let reconciler = ReconciliationService::new(Arc::new(probe));

        let mut watched = Registry::default();
        let (_tx, control) = os_control();
        watched
            .insert(handle("watched", ProcessKind::ExternalCommand), Some(control))
            .unwrap();
        assert_eq!(watched.reconcile(&reconciler, true), 0);
        assert!(watched.get("watched").unwrap().control.is_some());

        let mut reloaded = Registry::from_handles(vec![handle("orphan", ProcessKind::WorkerFunction)]);
        assert_eq!(reloaded.reconcile(&reconciler, false), 0);
        assert_eq!(reloaded.get("orphan").unwrap().handle.status(), ProcessStatus::Running);
    }

    #[test]
    fn test_remove_requires_settled_handle() {
        let mut registry = Registry::default();
        registry.insert(handle("a", ProcessKind::ExternalCommand), None).unwrap();

        assert_eq!(
            registry.remove("a").unwrap_err(),
            DomainError::HandleActive("a".into())
        );
        registry.get_mut("a").unwrap().handle.mark_failed(1).unwrap();
        assert!(registry.remove("a").is_ok());
        assert_eq!(
            registry.remove("a").unwrap_err(),
            DomainError::HandleNotFound("a".into())
        );
    }

    #[test]
    fn test_from_handles_keeps_first_duplicate() {
        let mut first = handle("dup", ProcessKind::ExternalCommand);
        first.mark_stopped(0).unwrap();
        let registry = Registry::from_handles(vec![
            first,
            handle("dup", ProcessKind::ExternalCommand),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("dup").unwrap().handle.status(), ProcessStatus::Stopped);
    }

    #[test]
    fn test_snapshot_in_creation_order() {
        let mut registry = Registry::default();
        registry.insert(handle("b", ProcessKind::ExternalCommand), None).unwrap();
        registry.insert(handle("a", ProcessKind::ExternalCommand), None).unwrap();
        let ids: Vec<String> = registry
            .snapshot()
            .iter()
            .map(|h| h.handle_id().to_string())
            .collect();
        assert_eq!(ids, ["b", "a"]);
    }
}
