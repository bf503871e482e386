//! `regent check`: validate and lint a settings file.

use crate::config::{self, linter};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;

pub fn run_check(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            match config::find_settings_file(&cwd) {
                Some(p) => p,
                None => bail!("No .regent.yaml found. Create one with `regent init`."),
            }
        }
    };

    let settings = config::parse_settings_file(&path)?;

    println!();
    println!("  {} Settings are valid!", "✓".green().bold());
    println!("  File:      {}", path.display().to_string().dimmed());
    println!("  Mode:      {}", settings.hitl_mode.to_string().cyan());
    println!("  Reviewer:  {}", settings.reviewer);
    println!("  Plan gate: {}", settings.plan_approval);
    println!("  Timeout:   {}s", settings.approval_timeout_secs);
    println!(
        "  Workers:   {}{}",
        settings.effective_workers(),
        if settings.parallel_execution {
            ""
        } else {
            " (sequential)"
        }
    );
    println!("  Data dir:  {}", settings.data_dir.display());

    let warnings = linter::lint_settings(&settings);
    if warnings.is_empty() {
        println!();
        println!("  {} No issues found.", "✓".green());
    } else {
        println!();
        println!(
            "  {} {} {}:",
            "─".repeat(20).dimmed(),
            warnings.len(),
            if warnings.len() == 1 {
                "suggestion"
            } else {
                "suggestions"
            }
        );
        println!();
        for warning in &warnings {
            println!("{}", warning.display());
        }
    }
    println!();
    Ok(())
}
