// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Handle identity
//! Caller-supplied or generated, immutable once a handle exists.

use std::borrow::Borrow;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProcessKind;
use crate::domain::{DomainError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HandleId(String);

impl HandleId {
    /// Validates a caller-supplied id. Ids name log files, so path
    /// separators and whitespace are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidArgument(
                "handle id cannot be empty".to_string(),
            ));
        }
        if id.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(DomainError::InvalidArgument(format!(
                "handle id '{id}' contains whitespace or a path separator"
            )));
        }
        Ok(Self(id))
    }

    /// `<prefix>-<utc timestamp>-<random suffix>`
    pub fn generate(kind: ProcessKind) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}",
            kind.id_prefix(),
            Utc::now().format("%Y%m%d%H%M%S"),
            &suffix[..8]
        ))
    }

    /// Uses the supplied id when present, otherwise generates one.
    pub fn resolve(requested: Option<&str>, kind: ProcessKind) -> Result<Self> {
        match requested {
            Some(id) => Self::new(id),
            None => Ok(Self::generate(kind)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HandleId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<HandleId> for String {
    fn from(id: HandleId) -> Self {
        id.0
    }
}

// Lets registries keyed by HandleId be queried with a plain &str.
impl Borrow<str> for HandleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HandleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert_eq!(HandleId::new("t1").unwrap().as_str(), "t1");
        assert!(HandleId::new("log-streamer.prod_2").is_ok());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(HandleId::new("").is_err());
        assert!(HandleId::new("has space").is_err());
        assert!(HandleId::new("../escape").is_err());
        assert!(HandleId::new("tab\tid").is_err());
    }

    #[test]
    fn test_generated_ids_are_prefixed_and_unique() {
        let a = HandleId::generate(ProcessKind::WorkerFunction);
        let b = HandleId::generate(ProcessKind::WorkerFunction);
        assert!(a.as_str().starts_with("worker-"));
        assert_ne!(a, b);
        // prefix, 14 digit timestamp, 8 hex chars
        let parts: Vec<&str> = a.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 14);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_resolve() {
        let id = HandleId::resolve(Some("mine"), ProcessKind::CooperativeTask).unwrap();
        assert_eq!(id.as_str(), "mine");
        let id = HandleId::resolve(None, ProcessKind::CooperativeTask).unwrap();
        assert!(id.as_str().starts_with("task-"));
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<HandleId>("\"ok\"").is_ok());
        assert!(serde_json::from_str::<HandleId>("\"\"").is_err());
    }
}
