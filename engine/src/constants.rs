// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Constants shared across the engine

/// Lifecycle timings and limits
pub mod lifecycle {
    /// Grace period between the termination request and the forced kill.
    pub const DEFAULT_STOP_GRACE_PERIOD_SEC: u64 = 5;

    /// Concurrent worker-function processes.
    pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

    /// How long to wait for a unit of work to disappear after SIGKILL/abort.
    pub const KILL_CONFIRM_TIMEOUT_SEC: u64 = 10;

    /// Poll interval used when only the OS liveness probe is available.
    pub const LIVENESS_POLL_INTERVAL_MS: u64 = 100;

    /// Bound on draining captured pipes after a timed-out child was killed.
    pub const OUTPUT_DRAIN_TIMEOUT_MS: u64 = 1000;
}

/// Exit codes recorded on handles and results
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// Cooperative task returned an error.
    pub const TASK_FAILED: i32 = 1;
    /// Cooperative task panicked.
    pub const TASK_PANICKED: i32 = 101;
    /// Blocking run exceeded its timeout.
    pub const TIMEOUT: i32 = 124;
    pub const LAUNCH_FAILED: i32 = 127;
    /// Death by signal N is recorded as `SIGNAL_BASE + N`.
    pub const SIGNAL_BASE: i32 = 128;
    /// SIGKILL, or an aborted cooperative task.
    pub const KILLED: i32 = SIGNAL_BASE + 9;
    /// The unit vanished while nobody was watching it.
    pub const UNKNOWN: i32 = -1;
}

/// Registry file layout
pub mod persistence {
    pub const SNAPSHOT_VERSION: u32 = 1;
    pub const REGISTRY_FILE_NAME: &str = "processes.json";
    pub const LOGS_DIR_NAME: &str = "logs";
    pub const STATE_DIR_NAME: &str = "upm";
    pub const SAVE_ATTEMPTS: u32 = 3;
    pub const SAVE_RETRY_DELAY_MS: u64 = 100;
}

/// Worker child protocol
pub mod worker {
    /// First argument that turns the worker program into a worker child.
    pub const ENTRYPOINT_ARG: &str = "__upm-worker";
    /// Exit code of a worker child asked to run an unregistered function.
    pub const UNKNOWN_FUNCTION_EXIT: u8 = 2;
}
