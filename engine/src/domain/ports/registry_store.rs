// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Registry store port
//! Durable mirror of the registry. Stores only serialize snapshots handed to
//! them; they never hold live entries.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::Result;
use crate::domain::entities::ProcessHandle;

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Missing storage yields an empty registry. Unusable storage yields
    /// `DomainError::PersistenceWarning`.
    async fn load(&self) -> Result<Vec<ProcessHandle>>;

    /// Replaces the stored registry with `handles`, in the given order.
    async fn save(&self, handles: &[ProcessHandle]) -> Result<()>;

    /// Backing file, if any.
    fn location(&self) -> Option<&Path> {
        None
    }
}
