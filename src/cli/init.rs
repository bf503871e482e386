//! `regent init`: write a starter settings file.

use crate::config::defaults;
use crate::config::types::SETTINGS_FILE_NAME;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

pub fn run_init(template: Option<&str>, output_path: Option<&str>, force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let output_file = output_path
        .map(PathBuf::from)
        .unwrap_or_else(|| cwd.join(SETTINGS_FILE_NAME));

    if output_file.exists() && !force {
        println!(
            "{} A settings file already exists at {}",
            "⚠".yellow(),
            output_file.display()
        );
        println!("  Use --force to overwrite it, or edit it directly.");
        return Ok(());
    }

    let template_name = template.unwrap_or("review-plan");
    let yaml_content = defaults::get_template(template_name).ok_or_else(|| {
        let available: Vec<String> = defaults::available_templates()
            .iter()
            .map(|(name, desc)| format!("  {} - {}", name.bold(), desc))
            .collect();
        anyhow::anyhow!(
            "Unknown template '{}'. Available templates:\n{}",
            template_name,
            available.join("\n")
        )
    })?;

    std::fs::write(&output_file, yaml_content)
        .with_context(|| format!("Failed to write settings file: {}", output_file.display()))?;

    println!();
    println!(
        "  {} Created {}",
        "✓".green().bold(),
        output_file.display().to_string().bold()
    );
    println!("  Template: {}", template_name.cyan());
    println!();
    println!("  {} Next steps:", "→".blue());
    println!(
        "    1. Review the settings: {}",
        format!("regent check {}", output_file.display()).dimmed()
    );
    println!(
        "    2. Plan tests for a feature: {}",
        "regent plan --app <name> --feature <text> --plan-file <plan.md> --hitl".dimmed()
    );
    println!("    3. Decide pending approvals: {}", "regent approvals list".dimmed());
    println!();

    Ok(())
}
