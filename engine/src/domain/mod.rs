// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Domain layer
//! Handle model, error taxonomy, ports and reconciliation rules. No I/O.

pub mod commands;
pub mod entities;
mod error;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use commands::{CommandRequest, ListFilter, WorkerRequest};
pub use entities::{ProcessHandle, ProcessResult};
pub use error::{DomainError, Result};
pub use value_objects::{HandleId, ProcessKind, ProcessStatus};
