// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! JSON registry store
//!
//! One versioned document holding every handle record in creation order.
//! Writes go to a temp file in the target directory, are fsynced and then
//! renamed over the target, so a crash mid-write leaves the old file intact.
//! Reads never fail hard: a missing file is an empty registry and an
//! unusable one is reported as `PersistenceWarning`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::constants::persistence::{SAVE_ATTEMPTS, SAVE_RETRY_DELAY_MS, SNAPSHOT_VERSION};
use crate::domain::entities::ProcessHandle;
use crate::domain::ports::RegistryStore;
use crate::domain::{DomainError, Result};

#[derive(Serialize)]
struct RegistryDocumentOut<'a> {
    version: u32,
    updated_at: String,
    handles: &'a [ProcessHandle],
}

#[derive(Deserialize)]
struct RegistryDocumentIn {
    version: u32,
    #[serde(default)]
    handles: Vec<serde_json::Value>,
}

pub struct JsonRegistryStore {
    path: PathBuf,
}

impl JsonRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn warning(&self, reason: impl ToString) -> DomainError {
        DomainError::PersistenceWarning {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn decode(&self, content: &str) -> Result<Vec<ProcessHandle>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: RegistryDocumentIn =
            serde_json::from_str(content).map_err(|e| self.warning(e))?;
        if document.version != SNAPSHOT_VERSION {
            return Err(self.warning(format!(
                "unsupported registry version {} (expected {})",
                document.version, SNAPSHOT_VERSION
            )));
        }

        let mut handles = Vec::with_capacity(document.handles.len());
        for (index, record) in document.handles.into_iter().enumerate() {
            let decoded = serde_json::from_value::<ProcessHandle>(record)
                .map_err(|e| DomainError::InvalidArgument(e.to_string()))
                .and_then(|handle| handle.validate().map(|_| handle));
            match decoded {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(
                    path = %self.path.display(),
                    index,
                    error = %e,
                    "Skipping invalid registry record"
                ),
            }
        }
        Ok(handles)
    }
}

#[async_trait]
impl RegistryStore for JsonRegistryStore {
    async fn load(&self) -> Result<Vec<ProcessHandle>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No registry file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.warning(e)),
        };

        let handles = self.decode(&content)?;
        debug!(path = %self.path.display(), count = handles.len(), "Loaded registry");
        Ok(handles)
    }

    async fn save(&self, handles: &[ProcessHandle]) -> Result<()> {
        let document = RegistryDocumentOut {
            version: SNAPSHOT_VERSION,
            updated_at: Utc::now().to_rfc3339(),
            handles,
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| DomainError::Persistence(e.to_string()))?;

        let mut last_error = String::new();
        for attempt in 1..=SAVE_ATTEMPTS {
            let path = self.path.clone();
            let payload = bytes.clone();
            let outcome = tokio::task::spawn_blocking(move || write_atomic(&path, &payload))
                .await
                .map_err(|e| io::Error::other(e.to_string()))
                .and_then(|r| r);
            match outcome {
                Ok(()) => {
                    debug!(path = %self.path.display(), count = handles.len(), "Saved registry");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        attempt,
                        error = %e,
                        "Failed to write registry"
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < SAVE_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(SAVE_RETRY_DELAY_MS)).await;
            }
        }
        Err(DomainError::Persistence(format!(
            "{}: {}",
            self.path.display(),
            last_error
        )))
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Temp file in the same directory, fsync, rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // Persist the rename itself; not every filesystem supports this.
    if let Ok(handle) = std::fs::File::open(&dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}
