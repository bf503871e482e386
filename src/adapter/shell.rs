//! Adapter that runs test steps as shell commands.
//!
//! A case with a `script_path` runs that script; otherwise each step's
//! `action` is one command. Commands run with `sh -c` in the workspace
//! directory, and a step passes when its command exits 0.

use crate::adapter::types::*;
use crate::adapter::Adapter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Result of a shell command execution.
#[derive(Debug)]
pub struct ShellResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ShellResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output for step results.
    pub fn to_output(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str(self.stdout.trim_end());
        }
        if !self.stderr.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str("[stderr] ");
            output.push_str(self.stderr.trim_end());
        }
        if output.is_empty() {
            output = format!("(exit code: {})", self.exit_code);
        }
        output
    }
}

/// Execute a shell command in `workspace_root`.
pub async fn execute_command(
    workspace_root: &Path,
    command: &str,
    env: &[(&str, &str)],
) -> Result<ShellResult> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workspace_root)
        .envs(env.iter().copied())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to execute command: {}", command))?;

    Ok(ShellResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

pub struct ShellAdapter {
    workspace: PathBuf,
    step_timeout: Option<Duration>,
}

impl ShellAdapter {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            step_timeout: None,
        }
    }

    /// Fail any step that runs longer than `timeout`.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn commands(case: &TestCase) -> Vec<(u32, String)> {
        match case.script_path {
            Some(ref script) => vec![(1, script.clone())],
            None => case
                .steps
                .iter()
                .map(|s| (s.step_number, s.action.clone()))
                .collect(),
        }
    }

    async fn run_step(&self, case: &TestCase, number: u32, command: &str) -> StepResult {
        let env = [("REGENT_TEST_ID", case.id.as_str()), ("REGENT_TEST_NAME", case.name.as_str())];
        let started = Instant::now();
        let run = execute_command(&self.workspace, command, &env);

        let outcome = match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "Step timed out after {}s",
                    limit.as_secs_f64()
                )),
            },
            None => run.await,
        };
        let duration_seconds = started.elapsed().as_secs_f64();

        match outcome {
            Ok(shell) if shell.success() => StepResult {
                step_number: number,
                status: TestStatus::Passed,
                actual_result: shell.to_output(),
                error_message: None,
                duration_seconds,
            },
            Ok(shell) => StepResult {
                step_number: number,
                status: TestStatus::Failed,
                actual_result: shell.to_output(),
                error_message: Some(format!("Command exited with code {}", shell.exit_code)),
                duration_seconds,
            },
            Err(e) => StepResult {
                step_number: number,
                status: TestStatus::Error,
                actual_result: String::new(),
                error_message: Some(format!("{:#}", e)),
                duration_seconds,
            },
        }
    }
}

#[async_trait]
impl Adapter for ShellAdapter {
    fn name(&self) -> &str {
        "shell"
    }

    /// Scripts (`*.sh`) directly inside the workspace.
    async fn discover(&self) -> Result<DiscoveryResult> {
        let mut discovery = DiscoveryResult::default();
        let entries = std::fs::read_dir(&self.workspace).with_context(|| {
            format!("Failed to read workspace: {}", self.workspace.display())
        })?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sh") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            discovery.elements.push(Element {
                id: name.to_string(),
                kind: "script".to_string(),
                name: name.to_string(),
                selector: None,
                endpoint: Some(path.display().to_string()),
                attributes: Default::default(),
            });
        }
        discovery.elements.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(discovery)
    }

    async fn execute_test(&self, case: &TestCase) -> Result<TestResult> {
        let start_time = Utc::now();
        let commands = Self::commands(case);

        if commands.is_empty() {
            let mut result = TestResult::new(
                case,
                TestStatus::Skipped,
                TestMetrics::between(start_time, Utc::now()),
            );
            result.error_message = Some("Test case has no steps to run".to_string());
            return Ok(result);
        }

        let mut steps = Vec::with_capacity(commands.len());
        let mut failed = false;
        for (number, command) in &commands {
            if failed {
                steps.push(StepResult {
                    step_number: *number,
                    status: TestStatus::Skipped,
                    actual_result: String::new(),
                    error_message: None,
                    duration_seconds: 0.0,
                });
                continue;
            }
            let step = self.run_step(case, *number, command).await;
            debug!(case = %case.id, step = number, status = %step.status, "Step finished");
            failed = step.status != TestStatus::Passed;
            steps.push(step);
        }

        let first_failure = steps
            .iter()
            .find(|s| matches!(s.status, TestStatus::Failed | TestStatus::Error));
        let status = if first_failure.is_some() {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };
        let error_message = first_failure.and_then(|s| {
            s.error_message
                .as_ref()
                .map(|e| format!("Step {}: {}", s.step_number, e))
        });

        let mut result = TestResult::new(case, status, TestMetrics::between(start_time, Utc::now()));
        result.error_message = error_message;
        result.step_results = steps;
        Ok(result)
    }

    async fn validate_state(&self) -> Result<bool> {
        Ok(self.workspace.is_dir())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            log_capture: true,
            ..Capabilities::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn case_with_steps(actions: &[&str]) -> TestCase {
        let mut case = TestCase::new("shell case", "app");
        for action in actions {
            case.add_step(*action, "");
        }
        case
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let tmp = TempDir::new().unwrap();
        let result = execute_command(tmp.path(), "echo hello", &[]).await.unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let tmp = TempDir::new().unwrap();
        let result = execute_command(tmp.path(), "false", &[]).await.unwrap();
        assert_ne!(result.exit_code, 0);
        assert_eq!(result.to_output(), format!("(exit code: {})", result.exit_code));
    }

    #[tokio::test]
    async fn test_passing_case() {
        let tmp = TempDir::new().unwrap();
        let adapter = ShellAdapter::new(tmp.path());
        let result = adapter
            .execute_test(&case_with_steps(&["true", "echo $REGENT_TEST_NAME"]))
            .await
            .unwrap();

        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.step_results[1].actual_result, "shell case");
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_steps() {
        let tmp = TempDir::new().unwrap();
        let adapter = ShellAdapter::new(tmp.path());
        let result = adapter
            .execute_test(&case_with_steps(&["true", "exit 3", "true"]))
            .await
            .unwrap();

        assert_eq!(result.status, TestStatus::Failed);
        let statuses: Vec<_> = result.step_results.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![TestStatus::Passed, TestStatus::Failed, TestStatus::Skipped]
        );
        assert_eq!(
            result.error_message.as_deref(),
            Some("Step 2: Command exited with code 3")
        );
    }

    #[tokio::test]
    async fn test_script_path_takes_precedence() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("check.sh"), "echo from-script\n").unwrap();
        let mut case = case_with_steps(&["false"]);
        case.script_path = Some("sh check.sh".to_string());

        let result = ShellAdapter::new(tmp.path()).execute_test(&case).await.unwrap();
        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(result.step_results[0].actual_result, "from-script");
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let tmp = TempDir::new().unwrap();
        let adapter = ShellAdapter::new(tmp.path()).with_step_timeout(Duration::from_millis(100));
        let result = adapter.execute_test(&case_with_steps(&["sleep 5"])).await.unwrap();

        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.step_results[0].status, TestStatus::Error);
        assert!(result.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_case_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let result = ShellAdapter::new(tmp.path())
            .execute_test(&TestCase::new("empty", "app"))
            .await
            .unwrap();
        assert_eq!(result.status, TestStatus::Skipped);
    }

    #[tokio::test]
    async fn test_discover_lists_scripts() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.sh"), "").unwrap();
        std::fs::write(tmp.path().join("a.sh"), "").unwrap();
        std::fs::write(tmp.path().join("notes.md"), "").unwrap();

        let adapter = ShellAdapter::new(tmp.path());
        let found = adapter.discover().await.unwrap();
        let ids: Vec<_> = found.elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a.sh", "b.sh"]);
        assert!(adapter.validate_state().await.unwrap());
        assert!(adapter.capabilities().log_capture);
    }
}
