//! `regent feedback`: record and inspect human feedback.

use crate::cli::{format_time, print_json, truncate};
use crate::config::Settings;
use crate::feedback::{Feedback, FeedbackDraft, FeedbackStore};
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum FeedbackCommand {
    /// Record feedback on an item
    Add {
        /// The test result, test case or other item the feedback is about
        item_id: String,
        #[arg(long = "type", default_value = "test_result")]
        item_type: String,
        #[arg(long, env = "REGENT_REVIEWER")]
        by: Option<String>,
        #[arg(long)]
        comment: String,
        /// 1 to 5
        #[arg(long)]
        rating: Option<u8>,
        /// Suggested corrections as JSON
        #[arg(long)]
        corrections: Option<String>,
        #[arg(long)]
        false_positive: bool,
        #[arg(long)]
        false_negative: bool,
        #[arg(long)]
        known_issue: bool,
        #[arg(long)]
        needs_investigation: bool,
    },

    /// List feedback, oldest first
    List {
        #[arg(long)]
        item: Option<String>,
        #[arg(long = "type")]
        item_type: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Totals, flag counts and average rating
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Write every feedback as a knowledge-base document
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run_feedback(settings: &Settings, command: FeedbackCommand) -> Result<()> {
    let store = FeedbackStore::open(settings.feedback_dir()).with_context(|| {
        format!(
            "Failed to open feedback store at {}",
            settings.feedback_dir().display()
        )
    })?;

    match command {
        FeedbackCommand::Add {
            item_id,
            item_type,
            by,
            comment,
            rating,
            corrections,
            false_positive,
            false_negative,
            known_issue,
            needs_investigation,
        } => {
            let corrections = corrections
                .map(|c| serde_json::from_str::<Value>(&c))
                .transpose()
                .context("--corrections must be valid JSON")?;
            let draft = FeedbackDraft {
                rating,
                comment,
                corrections,
                is_false_positive: false_positive,
                is_false_negative: false_negative,
                is_known_issue: known_issue,
                needs_investigation,
                provided_by: by.unwrap_or_default(),
            };
            let feedback = Feedback::from_draft(item_id, item_type, draft)?;
            store
                .save(&feedback)
                .with_context(|| format!("Failed to save feedback {}", feedback.id))?;
            tracing::info!(id = %feedback.id, item = %feedback.item_id, "Feedback recorded");

            println!();
            println!(
                "  {} Recorded {} for {} {}",
                "✓".green().bold(),
                feedback.id.bold(),
                feedback.item_type,
                feedback.item_id
            );
            println!();
            Ok(())
        }

        FeedbackCommand::List {
            item,
            item_type,
            json,
        } => {
            let mut records = match item {
                Some(ref id) => store.for_item(id)?,
                None => store.all(item_type.as_deref())?,
            };
            if let (Some(_), Some(ref kind)) = (&item, &item_type) {
                records.retain(|f| &f.item_type == kind);
            }
            if json {
                return print_json(&records);
            }

            println!();
            if records.is_empty() {
                println!("  {} No feedback recorded.", "ℹ".blue());
                println!();
                return Ok(());
            }
            for fb in &records {
                print_feedback_line(fb);
            }
            println!();
            Ok(())
        }

        FeedbackCommand::Stats { json } => {
            let stats = store.statistics()?;
            if json {
                return print_json(&stats);
            }
            println!();
            println!("  {} feedback records", stats.total_feedback.to_string().bold());
            for (kind, count) in &stats.by_type {
                println!("    {:<16} {}", kind, count);
            }
            println!();
            println!("  False positives:     {}", stats.false_positives);
            println!("  False negatives:     {}", stats.false_negatives);
            println!("  Known issues:        {}", stats.known_issues);
            println!("  Needs investigation: {}", stats.needs_investigation);
            println!("  Average rating:      {:.2}", stats.average_rating);
            println!();
            Ok(())
        }

        FeedbackCommand::Export { output } => {
            let documents = store.export_documents()?;
            let text = documents.join("\n\n---\n\n");
            match output {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "  {} Exported {} document(s) to {}",
                        "✓".green().bold(),
                        documents.len(),
                        path.display()
                    );
                }
                None => println!("{}", text),
            }
            Ok(())
        }
    }
}

fn print_feedback_line(fb: &Feedback) {
    let mut flags = Vec::new();
    if fb.is_false_positive {
        flags.push("false-positive");
    }
    if fb.is_false_negative {
        flags.push("false-negative");
    }
    if fb.is_known_issue {
        flags.push("known-issue");
    }
    if fb.needs_investigation {
        flags.push("investigate");
    }
    let rating = fb
        .rating
        .map(|r| format!("{}/5", r))
        .unwrap_or_else(|| "-".to_string());

    println!(
        "  {} {} {} {:<4} {}",
        format_time(fb.provided_at).dimmed(),
        fb.id.bold(),
        fb.item_id,
        rating,
        truncate(&fb.comment, 50)
    );
    if !flags.is_empty() {
        println!("      {}", flags.join(", ").yellow());
    }
}
