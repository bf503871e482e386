//! `regent` with no subcommand: what is configured and what is waiting.

use crate::config::Settings;
use crate::pipeline::CheckpointReader;
use crate::store::ApprovalStore;
use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use std::path::Path;

pub fn show_status(settings: &Settings, source: Option<&Path>) -> Result<()> {
    println!();
    println!(
        "  {}  {}",
        "regent".bold(),
        "agentic regression testing".dimmed()
    );
    println!("  {}", "━".repeat(41).dimmed());
    println!();
    match source {
        Some(path) => println!("  Settings: {}", path.display().to_string().dimmed()),
        None => println!(
            "  Settings: {} (run {} to create a file)",
            "defaults".yellow(),
            "regent init".bold()
        ),
    }
    println!(
        "  Mode:     {} via {} reviewer",
        settings.hitl_mode.to_string().cyan(),
        settings.reviewer
    );
    println!("  Data:     {}", settings.data_dir.display());

    if settings.approvals_dir().exists() {
        let store = ApprovalStore::open(settings.approvals_dir())?;
        let pending = store.list_pending(Utc::now())?.len();
        println!();
        if pending == 0 {
            println!("  {} No approvals waiting.", "✓".green());
        } else {
            println!(
                "  {} {} approval(s) waiting: {}",
                "⚠".yellow(),
                pending.to_string().bold(),
                "regent approvals list".dimmed()
            );
        }
    }

    if let Some(run) = CheckpointReader::new(settings.runs_dir()).latest_run()? {
        println!(
            "  Last run: {} {} ({}, {})",
            run.app_name.cyan(),
            run.run_id.dimmed(),
            run.status,
            run.last_stage
        );
    }

    println!();
    println!("  {}", "Commands:".dimmed());
    println!("    {}      plan tests for a feature", "regent plan".bold());
    println!("    {} decide pending approvals", "regent approvals".bold());
    println!("    {}   run test cases", "regent execute".bold());
    println!("    {}     validate your settings", "regent check".bold());
    println!();
    Ok(())
}
