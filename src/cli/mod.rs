//! Subcommand implementations for the `regent` binary.

pub mod approvals;
pub mod check;
pub mod desk;
pub mod execute;
pub mod feedback;
pub mod init;
pub mod plan;
pub mod runs;
pub mod status;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Human-readable duration: `42s`, `3m 7s`, `2h 15m`.
pub fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

pub(crate) fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", json);
    Ok(())
}

/// First `max` characters of `text`, with `...` when cut.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > max {
        let cut: String = first_line.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}
