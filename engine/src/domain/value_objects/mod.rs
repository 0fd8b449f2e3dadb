// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

mod handle_id;
mod process_kind;
mod process_status;

pub use handle_id::HandleId;
pub use process_kind::ProcessKind;
pub use process_status::ProcessStatus;
