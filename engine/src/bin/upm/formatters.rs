// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io::{self, Write};
use std::time::Duration;

use colored::{ColoredString, Colorize};
use tabwriter::TabWriter;
use upm_engine::{ProcessHandle, ProcessResult, ProcessStatus, RegistryInfo};

pub fn colored_status(status: ProcessStatus) -> ColoredString {
    let text = status.to_string();
    // Plain foreground colors only: every cell then carries the same escape
    // overhead and the table stays aligned.
    match status {
        ProcessStatus::Running => text.green(),
        ProcessStatus::Starting | ProcessStatus::Stopping => text.yellow(),
        ProcessStatus::Stopped => text.blue(),
        ProcessStatus::Failed => text.red(),
        ProcessStatus::Unknown => text.magenta(),
    }
}

pub fn print_handles<W: Write>(out: W, handles: &[ProcessHandle]) -> io::Result<()> {
    if handles.is_empty() {
        let mut out = out;
        return writeln!(out, "No handles");
    }

    let mut tw = TabWriter::new(out).padding(2);
    writeln!(
        tw,
        "ID\tKIND\t{}\tPID\tEXIT\tAGE\tDESCRIPTION",
        "STATUS".white()
    )?;
    for handle in handles {
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            handle.handle_id(),
            handle.kind().id_prefix(),
            colored_status(handle.status()),
            optional(handle.os_process_id()),
            optional(handle.exit_code()),
            format_duration(handle.elapsed()),
            truncate(handle.description(), 60),
        )?;
    }
    tw.flush()
}

pub fn print_started(handle: &ProcessHandle) {
    match handle.os_process_id() {
        Some(pid) => println!("Started {} (pid {pid})", handle.handle_id()),
        None => println!("Started {}", handle.handle_id()),
    }
    if let Some(log) = handle.log_file() {
        println!("Logging to {}", log.display());
    }
}

pub fn print_result(result: &ProcessResult) {
    let handle = result.handle();
    print!("{}", result.stdout());
    eprint!("{}", result.stderr());
    let mut summary = format!(
        "{}: {} exit={} after {}",
        handle.handle_id(),
        colored_status(handle.status()),
        result.exit_code(),
        format_duration(result.duration()),
    );
    if result.forced() {
        summary.push_str(" (forced)");
    }
    println!("{summary}");
}

pub fn print_info<W: Write>(out: W, info: &RegistryInfo) -> io::Result<()> {
    let mut tw = TabWriter::new(out).padding(2);
    let registry = match &info.registry_path {
        Some(path) => path.display().to_string(),
        None => "(in memory)".to_string(),
    };
    writeln!(tw, "Registry file:\t{registry}")?;
    writeln!(tw, "File exists:\t{}", info.file_exists)?;
    writeln!(tw, "Logs directory:\t{}", info.logs_dir.display())?;
    writeln!(tw, "Handles:\t{} ({} active)", info.total, info.active)?;
    writeln!(
        tw,
        "Worker pool:\t{}/{} in use",
        info.worker_pool_in_use, info.worker_pool_capacity
    )?;
    tw.flush()
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0 => format!("{}ms", duration.as_millis()),
        1..60 => format!("{secs}s"),
        60..3600 => format!("{}m{}s", secs / 60, secs % 60),
        3600..86400 => format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
        _ => format!("{}d{}h", secs / 86400, (secs % 86400) / 3600),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use upm_engine::{HandleId, ProcessKind};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_duration(Duration::from_secs(7260)), "2h1m");
        assert_eq!(format_duration(Duration::from_secs(90000)), "1d1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("sleep 1000000", 8), "sleep...");
    }

    #[test]
    fn test_table_lists_every_handle() {
        colored::control::set_override(false);
        let handles: Vec<ProcessHandle> = ["first", "second"]
            .into_iter()
            .map(|id| {
                ProcessHandle::builder(HandleId::new(id).unwrap(), ProcessKind::ExternalCommand, "sleep 5")
                    .build()
                    .unwrap()
            })
            .collect();

        let mut out = Vec::new();
        print_handles(&mut out, &handles).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with("first"));
        assert!(lines[2].contains("starting"));
        assert_eq!(lines[1].find("cmd"), lines[0].find("KIND"));
    }

    #[test]
    fn test_empty_table() {
        let mut out = Vec::new();
        print_handles(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No handles\n");
    }
}
