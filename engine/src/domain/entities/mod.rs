// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

mod process_handle;
mod process_result;

pub use process_handle::{ProcessHandle, ProcessHandleBuilder};
pub use process_result::ProcessResult;
pub(crate) use process_result::RunDetails;
