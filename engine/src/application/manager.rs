// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Process manager facade
//!
//! Single entry point for collaborators. Every call goes through the shared
//! registry; mutating calls flush it to the store afterwards.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::lifecycle::LifecycleController;
use super::registry::{Registry, SharedRegistry, lock};
use super::tasks::TaskContext;
use super::worker_pool::WorkerPool;
use super::workers::WorkerRegistry;
use crate::domain::ports::{ProcessProbe, RegistryStore};
use crate::domain::services::ReconciliationService;
use crate::domain::value_objects::{HandleId, ProcessKind, ProcessStatus};
use crate::domain::{
    CommandRequest, DomainError, ListFilter, ProcessHandle, ProcessResult, Result, WorkerRequest,
};
use crate::infrastructure::{InMemoryRegistryStore, JsonRegistryStore, ManagerConfig, SystemProbe};

/// Where the registry lives and how full it is.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryInfo {
    pub registry_path: Option<PathBuf>,
    pub logs_dir: PathBuf,
    pub file_exists: bool,
    pub total: usize,
    pub active: usize,
    pub worker_pool_capacity: usize,
    pub worker_pool_in_use: usize,
}

#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ManagerConfig,
    registry: SharedRegistry,
    store: Arc<dyn RegistryStore>,
    controller: LifecycleController,
    reconciler: ReconciliationService,
    persist_lock: tokio::sync::Mutex<()>,
}

impl ProcessManager {
    /// Manager backed by the JSON registry file named by `config`, with the
    /// built-in worker functions.
    pub async fn open(config: ManagerConfig) -> Result<Self> {
        let store = Arc::new(JsonRegistryStore::new(config.registry_path()));
        Self::with_components(config, store, Arc::new(SystemProbe), WorkerRegistry::with_builtins())
            .await
    }

    /// Manager whose registry is never written to disk.
    pub async fn in_memory(config: ManagerConfig) -> Result<Self> {
        Self::with_components(
            config,
            Arc::new(InMemoryRegistryStore::new()),
            Arc::new(SystemProbe),
            WorkerRegistry::with_builtins(),
        )
        .await
    }

    pub async fn with_components(
        config: ManagerConfig,
        store: Arc<dyn RegistryStore>,
        probe: Arc<dyn ProcessProbe>,
        workers: WorkerRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let reconciler = ReconciliationService::new(probe);

        let handles = match store.load().await {
            Ok(handles) => handles,
            Err(e) => {
                warn!(error = %e, "Starting with an empty registry");
                Vec::new()
            }
        };
        let mut registry = Registry::from_handles(handles);
        let moved = registry.reconcile(&reconciler, config.reconcile_on_load);
        info!(
            handles = registry.len(),
            reconciled = moved,
            location = ?store.location(),
            "Process registry loaded"
        );

        let controller = LifecycleController::new(
            WorkerPool::new(config.worker_pool_size),
            workers,
            config.worker_program.clone(),
            config.stop_grace_period(),
            reconciler.clone(),
        );
        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                registry: Mutex::new(registry),
                store,
                controller,
                reconciler,
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        };
        if moved > 0 {
            manager.flush().await;
        }
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn worker_pool(&self) -> &WorkerPool {
        self.inner.controller.pool()
    }

    pub fn workers(&self) -> &WorkerRegistry {
        self.inner.controller.workers()
    }

    // ------------------------------------------------------------------
    // Launch
    // ------------------------------------------------------------------

    /// Runs a command to completion. The handle is not registered.
    pub async fn run_external(&self, request: &CommandRequest) -> Result<ProcessResult> {
        self.inner.controller.run_external(request).await
    }

    pub async fn start_external_background(
        &self,
        request: &CommandRequest,
    ) -> Result<ProcessHandle> {
        let started = self
            .inner
            .controller
            .start_external(&self.inner.registry, request);
        self.flush_after(&started).await;
        started
    }

    /// Runs a worker function to completion and returns its JSON result.
    pub async fn run_worker(&self, request: &WorkerRequest) -> Result<Value> {
        self.inner.controller.run_worker(request).await
    }

    /// Suspends while the worker pool is saturated.
    pub async fn start_worker_background(&self, request: &WorkerRequest) -> Result<ProcessHandle> {
        let started = self
            .inner
            .controller
            .start_worker(&self.inner.registry, request)
            .await;
        self.flush_after(&started).await;
        started
    }

    /// Schedules `task` on the current runtime. Arguments are captured by the
    /// closure.
    pub async fn start_task<F, Fut>(
        &self,
        description: &str,
        handle_id: Option<&str>,
        task: F,
    ) -> Result<ProcessHandle>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let started =
            self.inner
                .controller
                .start_task(&self.inner.registry, description, handle_id, task);
        self.flush_after(&started).await;
        started
    }

    // ------------------------------------------------------------------
    // Control and queries
    // ------------------------------------------------------------------

    /// Returns false when the handle had already settled.
    pub async fn stop(&self, handle_id: &str, force: bool) -> Result<bool> {
        let stopped = self
            .inner
            .controller
            .stop(&self.inner.registry, handle_id, force)
            .await;
        self.flush_after(&stopped).await;
        stopped
    }

    pub async fn status(&self, handle_id: &str) -> Result<ProcessStatus> {
        let (handle, changed) = lock(&self.inner.registry).observe(handle_id)?;
        if changed {
            self.flush().await;
        }
        Ok(handle.status())
    }

    pub async fn get(&self, handle_id: &str) -> Option<ProcessHandle> {
        let observed = lock(&self.inner.registry).observe(handle_id);
        match observed {
            Ok((handle, changed)) => {
                if changed {
                    self.flush().await;
                }
                Some(handle)
            }
            Err(_) => None,
        }
    }

    /// Matching handles in creation order.
    pub async fn list(&self, filter: ListFilter) -> Vec<ProcessHandle> {
        let (handles, changed) = lock(&self.inner.registry).list(&filter);
        if changed {
            self.flush().await;
        }
        handles
    }

    /// A timeout leaves the unit of work running.
    pub async fn wait(&self, handle_id: &str, timeout: Option<Duration>) -> Result<ProcessResult> {
        let waited = self
            .inner
            .controller
            .wait(&self.inner.registry, handle_id, timeout)
            .await;
        self.flush_after(&waited).await;
        waited
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Reconciles against the OS and drops terminal handles that were
    /// already observed. Returns how many handles were reconciled.
    pub async fn cleanup_dead(&self) -> usize {
        let (moved, removed) = {
            let mut registry = lock(&self.inner.registry);
            let moved = registry.reconcile(&self.inner.reconciler, true);
            (moved, registry.remove_observed())
        };
        info!(reconciled = moved, removed, "Cleaned up dead processes");
        if moved > 0 || removed > 0 {
            self.flush().await;
        }
        moved
    }

    /// Drops a settled handle.
    pub async fn remove(&self, handle_id: &str) -> Result<ProcessHandle> {
        let removed = lock(&self.inner.registry).remove(handle_id)?;
        debug!(handle_id, "Handle removed");
        self.flush().await;
        Ok(removed)
    }

    /// Force-stops every active handle, then empties the registry. Returns
    /// the number of handles removed.
    pub async fn reset(&self) -> Result<usize> {
        let active = lock(&self.inner.registry).ids_where(|e| e.handle.status().is_active());
        self.force_stop_all(&active).await;
        let removed = lock(&self.inner.registry).clear();
        warn!(removed, "Process registry reset");
        self.persist().await?;
        Ok(removed)
    }

    /// Aborts live cooperative tasks and flushes. Detached OS processes keep
    /// running and stay recorded.
    pub async fn shutdown(&self) -> Result<()> {
        let tasks = lock(&self.inner.registry).ids_where(|e| {
            e.handle.kind() == ProcessKind::CooperativeTask && e.control.is_some()
        });
        self.force_stop_all(&tasks).await;
        info!(tasks = tasks.len(), "Process manager shut down");
        self.persist().await
    }

    /// Writes the registry now and surfaces any failure.
    pub async fn save(&self) -> Result<()> {
        self.persist().await
    }

    pub async fn registry_info(&self) -> RegistryInfo {
        let (total, active) = {
            let mut registry = lock(&self.inner.registry);
            registry.settle_all();
            (registry.len(), registry.active_count())
        };
        let registry_path = self.inner.store.location().map(|p| p.to_path_buf());
        let file_exists = match &registry_path {
            Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            None => false,
        };
        let pool = self.worker_pool();
        RegistryInfo {
            registry_path,
            logs_dir: self.inner.config.logs_dir(),
            file_exists,
            total,
            active,
            worker_pool_capacity: pool.capacity(),
            worker_pool_in_use: pool.in_use(),
        }
    }

    async fn force_stop_all(&self, ids: &[HandleId]) {
        for id in ids {
            let stopped = self
                .inner
                .controller
                .stop(&self.inner.registry, id.as_str(), true)
                .await;
            if let Err(e) = stopped {
                warn!(handle_id = %id, error = %e, "Failed to stop handle");
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    async fn flush_after<T>(&self, outcome: &Result<T>) {
        match outcome {
            Err(e) if e.is_caller_error() => {}
            _ => self.flush().await,
        }
    }

    async fn flush(&self) {
        if let Err(e) = self.persist().await {
            warn!(error = %e, "Failed to persist process registry");
        }
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.inner.persist_lock.lock().await;
        let snapshot = lock(&self.inner.registry).snapshot();
        self.inner
            .store
            .save(&snapshot)
            .await
            .map_err(|e| match e {
                DomainError::Persistence(_) => e,
                other => DomainError::Persistence(other.to_string()),
            })
    }
}
