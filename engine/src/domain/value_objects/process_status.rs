// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Lifecycle state of a managed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Accepted, launch in progress.
    Starting,
    /// Unit of work is alive.
    Running,
    /// Termination requested, not yet confirmed.
    Stopping,
    /// Exited cleanly, or was stopped on request.
    Stopped,
    /// Launch error or abnormal exit without a stop request.
    Failed,
    /// Control reference lost across a manager restart.
    Unknown,
}

impl ProcessStatus {
    /// Stopped and Failed; these always carry an exit code.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Stopped | ProcessStatus::Failed)
    }

    /// No further transition is possible.
    pub fn is_settled(self) -> bool {
        self.is_terminal() || self == ProcessStatus::Unknown
    }

    pub fn is_active(self) -> bool {
        !self.is_settled()
    }

    pub fn can_stop(self) -> bool {
        matches!(self, ProcessStatus::Starting | ProcessStatus::Running)
    }

    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Starting, Unknown)
                | (Running, Unknown)
                | (Stopping, Unknown)
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Starting => write!(f, "starting"),
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Stopping => write!(f, "stopping"),
            ProcessStatus::Stopped => write!(f, "stopped"),
            ProcessStatus::Failed => write!(f, "failed"),
            ProcessStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for ProcessStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starting" => Ok(ProcessStatus::Starting),
            "running" => Ok(ProcessStatus::Running),
            "stopping" => Ok(ProcessStatus::Stopping),
            "stopped" => Ok(ProcessStatus::Stopped),
            "failed" => Ok(ProcessStatus::Failed),
            "unknown" => Ok(ProcessStatus::Unknown),
            other => Err(DomainError::InvalidArgument(format!(
                "unknown status '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProcessStatus::*;

    const ALL: [ProcessStatus; 6] = [Starting, Running, Stopping, Stopped, Failed, Unknown];

    #[test]
    fn test_normal_path() {
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }

    #[test]
    fn test_failure_paths() {
        assert!(Starting.can_transition_to(Failed));
        assert!(Running.can_transition_to(Failed));
        assert!(!Stopping.can_transition_to(Failed));
    }

    #[test]
    fn test_settled_states_have_no_exit() {
        for from in [Stopped, Failed, Unknown] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!Running.can_transition_to(Starting));
        assert!(!Stopping.can_transition_to(Running));
        for status in ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_classification() {
        assert!(Stopped.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Unknown.is_terminal());
        assert!(Unknown.is_settled());
        assert!(Stopping.is_active());
        assert!(Running.can_stop());
        assert!(!Stopping.can_stop());
    }

    #[test]
    fn test_parse_and_display() {
        for status in ALL {
            assert_eq!(status.to_string().parse::<ProcessStatus>().unwrap(), status);
        }
        assert_eq!("RUNNING".parse::<ProcessStatus>().unwrap(), Running);
        assert!("exited".parse::<ProcessStatus>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Stopping).unwrap(), "\"stopping\"");
    }
}
