// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Application layer
//! Registry, lifecycle control and the `ProcessManager` facade.

mod lifecycle;
mod manager;
mod registry;
mod tasks;
mod worker_pool;
mod workers;

pub use manager::{ProcessManager, RegistryInfo};
pub use tasks::TaskContext;
pub use worker_pool::WorkerPool;
pub use workers::{WorkerFn, WorkerRegistry, run_if_worker};
