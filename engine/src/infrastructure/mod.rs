// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Infrastructure layer
//! Adapters for the domain ports plus configuration and logging bootstrap.

pub mod config;
mod in_memory_registry_store;
mod json_registry_store;
pub mod logging;
pub(crate) mod os_process;

pub use config::ManagerConfig;
pub use in_memory_registry_store::InMemoryRegistryStore;
pub use json_registry_store::JsonRegistryStore;
pub use os_process::SystemProbe;
