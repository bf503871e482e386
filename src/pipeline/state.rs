//! Working memory of one planning run.

use crate::adapter::types::{DiscoveryResult, TestCase};
use crate::approval::types::ApprovalStatus;
use crate::pipeline::extract::CoverageAnalysis;
use crate::pipeline::generator::GeneratedPlan;
use crate::pipeline::retriever::RetrievedDocument;
use crate::utils::ids::run_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::InProgress => write!(f, "in_progress"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Stages of the planning graph, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialize,
    ValidateInput,
    RetrieveSimilarTests,
    RetrievePatterns,
    GeneratePlan,
    ExtractTestCases,
    RequestApproval,
    Finalize,
    HandleError,
}

impl Stage {
    /// The stage that follows this one for `state`, or `None` at the end.
    ///
    /// A stage that leaves an error behind routes to `HandleError`.
    /// `GeneratePlan` also routes there when it produced no plan.
    pub fn next(self, state: &PlanningState) -> Option<Stage> {
        if matches!(self, Stage::Finalize | Stage::HandleError) {
            return None;
        }
        if state.error.is_some() {
            return Some(Stage::HandleError);
        }
        match self {
            Stage::Initialize => Some(Stage::ValidateInput),
            Stage::ValidateInput => Some(Stage::RetrieveSimilarTests),
            Stage::RetrieveSimilarTests => Some(Stage::RetrievePatterns),
            Stage::RetrievePatterns => Some(Stage::GeneratePlan),
            Stage::GeneratePlan if state.test_plan.is_some() => Some(Stage::ExtractTestCases),
            Stage::GeneratePlan => Some(Stage::HandleError),
            Stage::ExtractTestCases => Some(Stage::RequestApproval),
            Stage::RequestApproval => Some(Stage::Finalize),
            Stage::Finalize | Stage::HandleError => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Initialize => "initialize",
            Stage::ValidateInput => "validate_input",
            Stage::RetrieveSimilarTests => "retrieve_similar_tests",
            Stage::RetrievePatterns => "retrieve_patterns",
            Stage::GeneratePlan => "generate_plan",
            Stage::ExtractTestCases => "extract_test_cases",
            Stage::RequestApproval => "request_approval",
            Stage::Finalize => "finalize",
            Stage::HandleError => "handle_error",
        };
        write!(f, "{}", s)
    }
}

/// Everything a planning run knows. Serialized whole after every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningState {
    pub run_id: String,
    pub app_name: String,
    pub feature_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryResult>,

    #[serde(default)]
    pub input_warnings: Vec<String>,
    #[serde(default)]
    pub similar_tests: Vec<RetrievedDocument>,
    #[serde(default)]
    pub test_patterns: Vec<RetrievedDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_plan: Option<GeneratedPlan>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageAnalysis>,

    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<ApprovalStatus>,

    #[serde(default)]
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last stage that ran to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
}

impl PlanningState {
    pub fn new(app_name: impl Into<String>, feature_description: impl Into<String>) -> Self {
        Self {
            run_id: run_id(),
            app_name: app_name.into(),
            feature_description: feature_description.into(),
            discovery: None,
            input_warnings: Vec::new(),
            similar_tests: Vec::new(),
            test_patterns: Vec::new(),
            test_plan: None,
            test_cases: Vec::new(),
            coverage: None,
            requires_approval: false,
            approval_id: None,
            approval_status: None,
            status: RunStatus::InProgress,
            error: None,
            last_stage: None,
            started_at: None,
            finished_at: None,
            elapsed_seconds: None,
        }
    }

    pub fn with_discovery(mut self, discovery: DiscoveryResult) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Record a stage failure. The router sends the run to `HandleError`.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// Stamp the end time and elapsed duration.
    pub fn finish(&mut self, status: RunStatus, now: DateTime<Utc>) {
        self.status = status;
        self.finished_at = Some(now);
        self.elapsed_seconds = self.started_at.map(|start| {
            (now - start)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0)
        });
    }

    /// Stage to run next, or `None` once the run has ended.
    pub fn next_stage(&self) -> Option<Stage> {
        match self.last_stage {
            None => Some(Stage::Initialize),
            Some(stage) => stage.next(self),
        }
    }
}
