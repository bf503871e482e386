//! `regent approvals`: list and decide approvals from the terminal.
//!
//! Decisions go straight to the approval store; a process waiting on the
//! approval with the polling reviewer picks them up from there.

use crate::approval::types::{Approval, ApprovalStatus};
use crate::cli::{format_duration, format_time, print_json, truncate};
use crate::config::Settings;
use crate::desk::ApprovalDesk;
use crate::store::ApprovalStore;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum ApprovalsCommand {
    /// List pending approvals
    List {
        /// Include decided and expired approvals
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show one approval in full
    Show { id: String },

    /// Approve a pending item
    Approve {
        id: String,
        #[arg(long, env = "REGENT_REVIEWER")]
        by: String,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Reject a pending item
    Reject {
        id: String,
        #[arg(long, env = "REGENT_REVIEWER")]
        by: String,
        #[arg(long)]
        reason: String,
    },

    /// Approve with changes: a JSON object merged over the item
    Modify {
        id: String,
        #[arg(long, env = "REGENT_REVIEWER")]
        by: String,
        #[arg(long)]
        patch: String,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Mark every expired pending approval as timed out
    Sweep,

    /// Counts per status and type, decision latency
    Stats {
        #[arg(long)]
        json: bool,
    },
}

pub fn open_desk(settings: &Settings) -> Result<ApprovalDesk> {
    let store = ApprovalStore::open(settings.approvals_dir()).with_context(|| {
        format!(
            "Failed to open approval store at {}",
            settings.approvals_dir().display()
        )
    })?;
    Ok(ApprovalDesk::new(Arc::new(store)))
}

pub fn run_approvals(settings: &Settings, command: ApprovalsCommand) -> Result<()> {
    let desk = open_desk(settings)?;

    match command {
        ApprovalsCommand::List { all, json } => list(&desk, all, json),
        ApprovalsCommand::Show { id } => {
            let approval = desk.detail(&id)?;
            print_approval(&approval);
            Ok(())
        }
        ApprovalsCommand::Approve { id, by, comment } => {
            let approval = desk.approve(&id, &by, comment)?;
            print_decided(&approval);
            Ok(())
        }
        ApprovalsCommand::Reject { id, by, reason } => {
            let approval = desk.reject(&id, &by, &reason)?;
            print_decided(&approval);
            Ok(())
        }
        ApprovalsCommand::Modify {
            id,
            by,
            patch,
            comment,
        } => {
            let modifications: Value =
                serde_json::from_str(&patch).context("--patch must be a JSON object")?;
            let approval = desk.modify(&id, &by, modifications, comment)?;
            print_decided(&approval);
            Ok(())
        }
        ApprovalsCommand::Sweep => {
            let swept = desk.sweep()?;
            println!();
            if swept.is_empty() {
                println!("  {} No expired approvals.", "ℹ".blue());
            } else {
                println!(
                    "  {} Marked {} approval(s) as timed out:",
                    "✓".green().bold(),
                    swept.len()
                );
                for a in &swept {
                    println!("    • {} {}", a.id, truncate(&a.item_summary, 50).dimmed());
                }
            }
            println!();
            Ok(())
        }
        ApprovalsCommand::Stats { json } => {
            let stats = desk.statistics()?;
            if json {
                return print_json(&stats);
            }
            println!();
            println!("  {} approvals", stats.total.to_string().bold());
            for (status, count) in &stats.by_status {
                println!("    {:<10} {}", status.to_string(), count);
            }
            println!();
            for (kind, count) in &stats.by_type {
                println!("    {:<16} {}", kind.to_string(), count);
            }
            if let Some(avg) = stats.average_decision_seconds {
                println!();
                println!("  Average decision time: {}", format_duration(avg.round() as i64));
            }
            if !stats.recent.is_empty() {
                println!();
                println!("  {}", "Recent decisions:".dimmed());
                for d in &stats.recent {
                    println!(
                        "    {} {} {} by {}",
                        format_time(d.approved_at).dimmed(),
                        d.id,
                        colored_status(d.status),
                        d.approved_by.as_deref().unwrap_or("-")
                    );
                }
            }
            println!();
            Ok(())
        }
    }
}

fn list(desk: &ApprovalDesk, all: bool, json: bool) -> Result<()> {
    if all {
        let now = Utc::now();
        let approvals = desk.store().list()?;
        if json {
            return print_json(&approvals);
        }
        println!();
        if approvals.is_empty() {
            println!("  {} No approvals recorded.", "ℹ".blue());
        }
        for a in &approvals {
            println!(
                "  {}  {:<16} {:<10} {}",
                a.id.bold(),
                a.approval_type.to_string(),
                colored_status(a.effective_status(now)),
                truncate(&a.item_summary, 50)
            );
        }
        println!();
        return Ok(());
    }

    let pending = desk.pending()?;
    if json {
        return print_json(&pending);
    }
    println!();
    if pending.is_empty() {
        println!("  {} Nothing waiting for a decision.", "ℹ".blue());
        println!();
        return Ok(());
    }
    println!("  {} pending approval(s):", pending.len().to_string().bold());
    println!();
    for p in &pending {
        println!(
            "  {}  {:<16} {} left",
            p.id.bold(),
            p.approval_type.to_string(),
            format_duration(p.time_remaining_seconds as i64).yellow()
        );
        println!("      {}", truncate(&p.item_summary, 70).dimmed());
    }
    println!();
    println!(
        "  Decide: {}",
        "regent approvals approve <id> --by <name>".dimmed()
    );
    println!();
    Ok(())
}

fn colored_status(status: ApprovalStatus) -> String {
    let s = status.to_string();
    match status {
        ApprovalStatus::Approved => s.green().to_string(),
        ApprovalStatus::Modified => s.cyan().to_string(),
        ApprovalStatus::Rejected => s.red().to_string(),
        ApprovalStatus::Timeout => s.dimmed().to_string(),
        ApprovalStatus::Pending => s.yellow().to_string(),
    }
}

fn print_approval(a: &Approval) {
    let now = Utc::now();
    println!();
    println!("  {} {}", a.id.bold(), colored_status(a.effective_status(now)));
    println!("  Type:      {}", a.approval_type);
    println!("  Item:      {}", a.item_id);
    println!("  Requested: {}", format_time(a.requested_at));
    if a.is_pending() {
        println!(
            "  Expires:   {} ({} left)",
            format_time(a.expires_at()),
            format_duration(a.time_remaining(now).as_secs() as i64)
        );
    }
    if let Some(ref by) = a.approved_by {
        println!("  Decided by: {}", by);
    }
    if let Some(at) = a.approved_at {
        println!("  Decided at: {}", format_time(at));
    }
    if let Some(ref reason) = a.rejection_reason {
        println!("  Reason:    {}", reason.red());
    }
    if let Some(ref comments) = a.comments {
        println!("  Comments:  {}", comments);
    }
    println!();
    println!("  {}", "Summary:".dimmed());
    for line in a.item_summary.lines() {
        println!("    {}", line);
    }
    println!();
    println!("  {}", "Item:".dimmed());
    let item = serde_json::to_string_pretty(a.resolved_item()).unwrap_or_default();
    for line in item.lines() {
        println!("    {}", line);
    }
    println!();
}

fn print_decided(a: &Approval) {
    println!();
    println!(
        "  {} {} is now {}",
        "✓".green().bold(),
        a.id.bold(),
        colored_status(a.status)
    );
    println!();
}
