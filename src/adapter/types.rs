//! Test cases, results and discovery output shared by adapters and the
//! executor.

use crate::utils::ids::{result_id, test_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl TestPriority {
    pub fn from_str_loose(s: &str) -> Option<TestPriority> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "p0" | "blocker" => Some(TestPriority::Critical),
            "high" | "p1" => Some(TestPriority::High),
            "medium" | "p2" | "normal" => Some(TestPriority::Medium),
            "low" | "p3" | "minor" => Some(TestPriority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for TestPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestPriority::Critical => write!(f, "critical"),
            TestPriority::High => write!(f, "high"),
            TestPriority::Medium => write!(f, "medium"),
            TestPriority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    #[default]
    Functional,
    Negative,
    Ui,
    Api,
    Database,
    Integration,
    E2e,
    Smoke,
    Regression,
    Performance,
    Security,
}

impl TestType {
    pub fn from_str_loose(s: &str) -> Option<TestType> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "functional" | "positive" => Some(TestType::Functional),
            "negative" | "error_handling" | "edge_case" => Some(TestType::Negative),
            "ui" | "web" => Some(TestType::Ui),
            "api" | "rest" | "http" => Some(TestType::Api),
            "database" | "db" => Some(TestType::Database),
            "integration" => Some(TestType::Integration),
            "e2e" | "end_to_end" => Some(TestType::E2e),
            "smoke" => Some(TestType::Smoke),
            "regression" => Some(TestType::Regression),
            "performance" | "load" => Some(TestType::Performance),
            "security" => Some(TestType::Security),
            _ => None,
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestType::Functional => "functional",
            TestType::Negative => "negative",
            TestType::Ui => "ui",
            TestType::Api => "api",
            TestType::Database => "database",
            TestType::Integration => "integration",
            TestType::E2e => "e2e",
            TestType::Smoke => "smoke",
            TestType::Regression => "regression",
            TestType::Performance => "performance",
            TestType::Security => "security",
        };
        write!(f, "{}", s)
    }
}

/// One step of a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    pub step_number: u32,
    /// For the shell adapter this is the command to run.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<Value>,
    #[serde(default)]
    pub expected_result: String,
}

fn default_true() -> bool {
    true
}

/// A test case, either extracted from a plan or loaded from a case file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default = "test_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_type: TestType,
    #[serde(default)]
    pub priority: TestPriority,
    #[serde(default)]
    pub steps: Vec<TestStep>,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub test_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub application: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Executable script for this case (run by the shell adapter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            id: test_id(),
            name: name.into(),
            description: String::new(),
            test_type: TestType::default(),
            priority: TestPriority::default(),
            steps: Vec::new(),
            preconditions: Vec::new(),
            test_data: BTreeMap::new(),
            application: application.into(),
            feature: None,
            script_path: None,
            tags: Vec::new(),
            requires_approval: true,
            approved_by: None,
        }
    }

    /// Append a step numbered after the existing ones.
    pub fn add_step(&mut self, action: impl Into<String>, expected_result: impl Into<String>) {
        let step_number = self.steps.len() as u32 + 1;
        self.steps.push(TestStep {
            step_number,
            action: action.into(),
            target: None,
            input_data: None,
            expected_result: expected_result.into(),
        });
    }
}

/// Execution status of a test or a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Blocked,
    Error,
    Running,
    Pending,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
            TestStatus::Blocked => "blocked",
            TestStatus::Error => "error",
            TestStatus::Running => "running",
            TestStatus::Pending => "pending",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub duration_seconds: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TestMetrics {
    pub fn between(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let duration_seconds = (end_time - start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            duration_seconds,
            start_time,
            end_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_number: u32,
    pub status: TestStatus,
    pub actual_result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_seconds: f64,
}

/// Outcome of executing one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub test_case_id: String,
    pub test_name: String,
    pub status: TestStatus,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub metrics: TestMetrics,
    #[serde(default)]
    pub environment: String,

    #[serde(default)]
    pub validated_by_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_comment: Option<String>,
    #[serde(default)]
    pub is_false_positive: bool,
    #[serde(default)]
    pub is_false_negative: bool,

    pub executed_at: DateTime<Utc>,
    pub executed_by: String,
}

impl TestResult {
    pub fn new(case: &TestCase, status: TestStatus, metrics: TestMetrics) -> Self {
        Self {
            id: result_id(),
            test_case_id: case.id.clone(),
            test_name: case.name.clone(),
            status,
            step_results: Vec::new(),
            error_message: None,
            metrics,
            environment: "test".to_string(),
            validated_by_human: false,
            human_comment: None,
            is_false_positive: false,
            is_false_negative: false,
            executed_at: Utc::now(),
            executed_by: "agent".to_string(),
        }
    }

    /// An ERROR result for a case whose execution blew up.
    pub fn errored(case: &TestCase, message: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut result = Self::new(case, TestStatus::Error, TestMetrics::between(now, now));
        result.error_message = Some(message.into());
        result
    }

    pub fn is_success(&self) -> bool {
        self.status == TestStatus::Passed
    }

    /// One-line reason for a failed or errored result.
    pub fn failure_summary(&self) -> Option<String> {
        if !matches!(self.status, TestStatus::Failed | TestStatus::Error) {
            return None;
        }
        let failed_steps: Vec<String> = self
            .step_results
            .iter()
            .filter(|s| s.status != TestStatus::Passed)
            .map(|s| s.step_number.to_string())
            .collect();
        let reason = self.error_message.as_deref().unwrap_or("no error message");
        if failed_steps.is_empty() {
            Some(format!("{} {}: {}", self.test_name, self.status, reason))
        } else {
            Some(format!(
                "{} {} at step(s) {}: {}",
                self.test_name,
                self.status,
                failed_steps.join(", "),
                reason
            ))
        }
    }
}

/// A discovered UI element or API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub apis: Vec<Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// What an adapter can do. Everything defaults to false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub ui_testing: bool,
    pub api_testing: bool,
    pub database_testing: bool,
    pub screenshot_capture: bool,
    pub video_recording: bool,
    pub log_capture: bool,
}
