// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

mod process_probe;
mod registry_store;

#[cfg(test)]
pub use process_probe::MockProcessProbe;
pub use process_probe::ProcessProbe;
pub use registry_store::RegistryStore;
