//! `regent execute`: run test cases through the shell adapter.

use crate::adapter::types::{TestCase, TestResult, TestStatus};
use crate::adapter::ShellAdapter;
use crate::approval::ConsoleReviewer;
use crate::cli::print_json;
use crate::config::Settings;
use crate::executor::{ExecutionSummary, TestExecutor};
use crate::feedback::{FeedbackCollector, FeedbackStore};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ExecuteOptions {
    /// YAML list of test cases.
    pub cases: PathBuf,
    /// Directory the commands run in. Defaults to the cases file's directory.
    pub workspace: Option<PathBuf>,
    pub workers: Option<usize>,
    pub sequential: bool,
    /// Ask on the terminal about every failed test.
    pub feedback: bool,
    pub json: bool,
}

pub fn load_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cases file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse cases file: {}", path.display()))
}

pub async fn run_execute(settings: &Settings, options: ExecuteOptions) -> Result<()> {
    let cases = load_cases(&options.cases)?;
    if cases.is_empty() {
        println!();
        println!("  {} No test cases in {}", "ℹ".blue(), options.cases.display());
        println!();
        return Ok(());
    }

    let workspace = match options.workspace {
        Some(dir) => dir,
        None => options
            .cases
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let mut executor = TestExecutor::new(Arc::new(ShellAdapter::new(workspace.clone())))
        .with_max_workers(options.workers.unwrap_or_else(|| settings.effective_workers()))
        .with_parallel(settings.parallel_execution && !options.sequential);

    if options.feedback {
        let store = FeedbackStore::open(settings.feedback_dir())?;
        executor = executor.with_feedback(Arc::new(FeedbackCollector::new(
            Arc::new(store),
            Arc::new(ConsoleReviewer::stdio()),
        )));
    }

    tracing::info!(
        cases = cases.len(),
        workers = executor.max_workers(),
        workspace = %workspace.display(),
        "Executing test cases"
    );
    let results = executor.execute_tests(cases).await;
    let summary = ExecutionSummary::from_results(&results);

    if options.json {
        print_json(&results)?;
    } else {
        print_results(&results, &summary);
    }

    let not_passed = summary.failed + summary.error;
    if not_passed > 0 {
        bail!("{} of {} test(s) did not pass", not_passed, summary.total);
    }
    Ok(())
}

fn print_results(results: &[TestResult], summary: &ExecutionSummary) {
    println!();
    for r in results {
        let icon = match r.status {
            TestStatus::Passed => "✓".green().bold(),
            TestStatus::Failed => "✗".red().bold(),
            TestStatus::Error => "!".red().bold(),
            _ => "-".dimmed(),
        };
        println!(
            "  {} {} {}",
            icon,
            r.test_name,
            format!("({:.2}s)", r.metrics.duration_seconds).dimmed()
        );
        if let Some(reason) = r.failure_summary() {
            println!("      {}", reason.dimmed());
        }
        if let Some(ref comment) = r.human_comment {
            println!("      {} {}", "reviewer:".dimmed(), comment);
        }
    }
    println!();
    println!("  {} {}", "─".repeat(40).dimmed(), summary);
    println!();
}
