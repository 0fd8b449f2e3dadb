// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory registry store
//! Keeps the last saved snapshot in memory. Used for ephemeral managers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::Result;
use crate::domain::entities::ProcessHandle;
use crate::domain::ports::RegistryStore;

#[derive(Default)]
pub struct InMemoryRegistryStore {
    handles: Mutex<Vec<ProcessHandle>>,
    saves: AtomicUsize,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handles(handles: Vec<ProcessHandle>) -> Self {
        Self {
            handles: Mutex::new(handles),
            saves: AtomicUsize::new(0),
        }
    }

    /// Copy of the last saved snapshot.
    pub fn snapshot(&self) -> Vec<ProcessHandle> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn load(&self) -> Result<Vec<ProcessHandle>> {
        Ok(self.snapshot())
    }

    async fn save(&self, handles: &[ProcessHandle]) -> Result<()> {
        *self.handles.lock().unwrap_or_else(PoisonError::into_inner) = handles.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
