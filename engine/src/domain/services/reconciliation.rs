// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Reconciliation
//! Brings recorded status in line with what the OS reports. Only handles
//! that are still active are touched.

use std::sync::Arc;

use tracing::{info, warn};

use crate::constants::exit_codes;
use crate::domain::Result;
use crate::domain::entities::ProcessHandle;
use crate::domain::ports::ProcessProbe;
use crate::domain::value_objects::{ProcessKind, ProcessStatus};

#[derive(Clone)]
pub struct ReconciliationService {
    probe: Arc<dyn ProcessProbe>,
}

impl ReconciliationService {
    pub fn new(probe: Arc<dyn ProcessProbe>) -> Self {
        Self { probe }
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.probe.is_alive(pid)
    }

    /// Reconciles one handle and returns the status it was moved to.
    ///
    /// `has_live_control` tells whether this manager still holds the control
    /// reference (child process or task) for the handle.
    pub fn reconcile(
        &self,
        handle: &mut ProcessHandle,
        has_live_control: bool,
    ) -> Result<Option<ProcessStatus>> {
        if handle.status().is_settled() {
            return Ok(None);
        }

        if handle.kind() == ProcessKind::CooperativeTask {
            if has_live_control {
                return Ok(None);
            }
            handle.mark_unknown()?;
            warn!(
                handle_id = %handle.handle_id(),
                "Cooperative task lost its control reference, marked unknown"
            );
            return Ok(Some(ProcessStatus::Unknown));
        }

        if let Some(pid) = handle.os_process_id()
            && self.probe.is_alive(pid)
        {
            return Ok(None);
        }

        let next = Self::mark_vanished(handle)?;
        info!(
            handle_id = %handle.handle_id(),
            pid = ?handle.os_process_id(),
            status = %next,
            "Backing process is gone"
        );
        Ok(Some(next))
    }

    /// Records a unit whose exit was not witnessed. A pending stop request
    /// still ends in `Stopped`.
    pub fn mark_vanished(handle: &mut ProcessHandle) -> Result<ProcessStatus> {
        if handle.status() == ProcessStatus::Stopping {
            handle.mark_stopped(exit_codes::UNKNOWN)?;
            Ok(ProcessStatus::Stopped)
        } else {
            handle.mark_failed(exit_codes::UNKNOWN)?;
            Ok(ProcessStatus::Failed)
        }
    }
}
