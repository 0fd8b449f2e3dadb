// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Unified Process Manager Engine
//!
//! Manages three kinds of units of work behind one handle-based API:
//! - External commands, run to completion or detached in their own session
//! - Worker functions, re-executed in a separate OS process through a bounded pool
//! - Cooperative tasks on the caller's tokio runtime
//!
//! Handles live in a registry that is mirrored to a JSON file and reconciled
//! against the OS after a restart.

#[cfg(not(unix))]
compile_error!("upm-engine only supports unix platforms");

pub mod constants;

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    ProcessManager, RegistryInfo, TaskContext, WorkerFn, WorkerPool, WorkerRegistry, run_if_worker,
};
pub use domain::{
    CommandRequest, DomainError, HandleId, ListFilter, ProcessHandle, ProcessKind, ProcessResult,
    ProcessStatus, Result, WorkerRequest,
};
pub use infrastructure::ManagerConfig;
