//! `regent plan`: run the planning pipeline and print its report.

use crate::adapter::types::DiscoveryResult;
use crate::approval::{ApprovalManager, ApprovalStatus};
use crate::cli::print_json;
use crate::config::Settings;
use crate::pipeline::{
    CheckpointReader, FilePlanGenerator, InMemoryRetriever, InputSanitizer, PlanReport,
    PlanningPipeline, RunStatus,
};
use crate::store::ApprovalStore;
use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PlanOptions {
    pub app: Option<String>,
    pub feature: Option<String>,
    /// Markdown plan served to the pipeline in place of a model call.
    pub plan_file: PathBuf,
    /// YAML knowledge base of similar tests and patterns.
    pub knowledge: Option<PathBuf>,
    /// JSON discovery result for the application.
    pub discovery: Option<PathBuf>,
    /// Route the plan through the approval manager.
    pub hitl: bool,
    /// Continue this run from its last checkpoint.
    pub resume: Option<String>,
    pub json: bool,
}

pub async fn run_plan(settings: &Settings, options: PlanOptions) -> Result<()> {
    let sanitizer = InputSanitizer::new(settings.max_input_length, settings.strict_input)?;
    let mut pipeline = PlanningPipeline::new(
        Arc::new(FilePlanGenerator::new(&options.plan_file)),
        sanitizer,
    )
    .with_checkpoints(settings.runs_dir());

    if let Some(ref path) = options.knowledge {
        let retriever = InMemoryRetriever::from_file(path)?;
        tracing::info!(documents = retriever.len(), "Knowledge base loaded");
        pipeline = pipeline.with_retriever(Arc::new(retriever));
    }

    if options.hitl {
        let store = ApprovalStore::open(settings.approvals_dir()).with_context(|| {
            format!(
                "Failed to open approval store at {}",
                settings.approvals_dir().display()
            )
        })?;
        let manager = ApprovalManager::from_settings(settings, Arc::new(store));
        pipeline = pipeline.with_approvals(Arc::new(manager), settings.plan_approval);
    }

    let state = match options.resume {
        Some(ref run_id) => {
            let snapshot = CheckpointReader::new(settings.runs_dir())
                .latest_snapshot(run_id)?
                .ok_or_else(|| anyhow!("Run '{}' has no checkpoints", run_id))?;
            pipeline.resume(snapshot).await?
        }
        None => {
            let app = options
                .app
                .as_deref()
                .ok_or_else(|| anyhow!("--app is required"))?;
            let feature = options
                .feature
                .as_deref()
                .ok_or_else(|| anyhow!("--feature is required"))?;
            let discovery = match options.discovery {
                Some(ref path) => Some(read_discovery(path)?),
                None => None,
            };
            pipeline.run(app, feature, discovery).await?
        }
    };

    let report = PlanReport::from_state(&state);
    if options.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if report.status == RunStatus::Failed {
        bail!(
            "Planning run {} failed: {}",
            report.run_id,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn read_discovery(path: &Path) -> Result<DiscoveryResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read discovery file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse discovery file: {}", path.display()))
}

fn print_report(report: &PlanReport) {
    let status = match report.status {
        RunStatus::Completed => "completed".green().bold(),
        RunStatus::Failed => "failed".red().bold(),
        RunStatus::InProgress => "in progress".yellow().bold(),
    };

    println!();
    println!(
        "  {} {} for {}",
        "Test plan".bold(),
        status,
        report.app_name.cyan()
    );
    println!("  Run:     {}", report.run_id.dimmed());
    println!("  Feature: {}", report.feature);
    if let Some(elapsed) = report.elapsed_seconds {
        println!("  Elapsed: {:.2}s", elapsed);
    }

    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning);
    }

    println!();
    println!(
        "  {} similar tests, {} patterns, {} test cases",
        report.statistics.similar_tests_found,
        report.statistics.patterns_retrieved,
        report.statistics.test_cases_extracted.to_string().bold()
    );

    if !report.test_cases.is_empty() {
        println!();
        for (i, case) in report.test_cases.iter().enumerate() {
            println!(
                "  {}. {} {}",
                i + 1,
                case.name.bold(),
                format!("[{}, {}]", case.priority, case.test_type).dimmed()
            );
            for step in &case.steps {
                println!("       {}. {}", step.step_number, step.action);
            }
        }
    }

    if let Some(ref coverage) = report.coverage {
        if !coverage.gaps.trim().is_empty() {
            println!();
            println!("  {}", "Gaps:".dimmed());
            for line in coverage.gaps.lines().filter(|l| !l.trim().is_empty()) {
                println!("    {}", line.trim());
            }
        }
    }

    if let Some(ref id) = report.approval_id {
        println!();
        let decision = report
            .approval_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "pending".to_string());
        println!("  Approval: {} ({})", id.bold(), decision);
        if matches!(report.approval_status, None | Some(ApprovalStatus::Pending)) {
            println!(
                "  Decide it with {}",
                format!("regent approvals show {}", id).dimmed()
            );
        }
    }

    if let Some(ref error) = report.error {
        println!();
        println!("  {} {}", "✗".red().bold(), error);
    }
    println!();
}
