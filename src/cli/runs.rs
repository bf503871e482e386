//! `regent runs`: browse planning-run checkpoints.

use crate::cli::{format_duration, format_time, print_json, truncate};
use crate::config::Settings;
use crate::pipeline::{CheckpointReader, RunStatus};
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

#[derive(Subcommand)]
pub enum RunsCommand {
    /// List recorded runs, most recent first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a run's final state, or every checkpoint with --all
    Show {
        run_id: String,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
}

pub fn run_runs(settings: &Settings, command: RunsCommand) -> Result<()> {
    let reader = CheckpointReader::new(settings.runs_dir());
    match command {
        RunsCommand::List { limit } => list(&reader, limit),
        RunsCommand::Show { run_id, all, json } => show(&reader, &run_id, all, json),
    }
}

fn list(reader: &CheckpointReader, limit: Option<usize>) -> Result<()> {
    let mut summaries = reader.summaries()?;
    if let Some(n) = limit {
        summaries.truncate(n);
    }

    if summaries.is_empty() {
        println!();
        println!("  {} No planning runs recorded.", "ℹ".blue());
        println!("  Start one with {}", "regent plan --app <name> ...".dimmed());
        println!();
        return Ok(());
    }

    println!();
    for s in &summaries {
        println!(
            "  {} {} {:<11} {:<18} {} - {}",
            format_time(s.updated_at).dimmed(),
            s.run_id.bold(),
            colored_status(s.status),
            s.last_stage.to_string(),
            s.app_name.cyan(),
            truncate(&s.feature, 40)
        );
        if let Some(ref error) = s.error {
            println!("      {}", truncate(error, 70).red());
        }
    }
    println!();
    println!("  View a run: {}", "regent runs show <run_id>".dimmed());
    println!();
    Ok(())
}

fn show(reader: &CheckpointReader, run_id: &str, all: bool, json: bool) -> Result<()> {
    let checkpoints = reader
        .read_run(run_id)
        .with_context(|| format!("Failed to read run: {}", run_id))?;

    if json {
        return if all {
            print_json(&checkpoints)
        } else {
            print_json(&checkpoints.last().map(|c| &c.state))
        };
    }

    let Some(last) = checkpoints.last() else {
        println!();
        println!("  {} Run {} has no checkpoints.", "ℹ".blue(), run_id);
        println!();
        return Ok(());
    };
    let state = &last.state;

    println!();
    println!("  Run: {}", state.run_id.cyan());
    println!("  App: {}  Feature: {}", state.app_name, state.feature_description);
    println!("  Status: {}", colored_status(state.status));

    if all {
        println!();
        for cp in &checkpoints {
            println!(
                "  {} {:<18} {}",
                format_time(cp.timestamp).dimmed(),
                cp.stage.to_string(),
                colored_status(cp.state.status)
            );
        }
    }

    println!();
    println!(
        "  {} test cases, {} similar tests, {} patterns",
        state.test_cases.len().to_string().bold(),
        state.similar_tests.len(),
        state.test_patterns.len()
    );
    if let Some(ref id) = state.approval_id {
        let decision = state
            .approval_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "pending".into());
        println!("  Approval: {} ({})", id, decision);
    }
    if let Some(elapsed) = state.elapsed_seconds {
        println!("  Duration: {}", format_duration(elapsed.round() as i64));
    }
    if let Some(ref error) = state.error {
        println!("  {} {}", "✗".red().bold(), error);
    }
    println!();
    Ok(())
}

fn colored_status(status: RunStatus) -> String {
    let s = status.to_string();
    match status {
        RunStatus::Completed => s.green().to_string(),
        RunStatus::Failed => s.red().to_string(),
        RunStatus::InProgress => s.yellow().to_string(),
    }
}
