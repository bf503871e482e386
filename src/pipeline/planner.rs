//! The planning pipeline.
//!
//! `initialize -> validate_input -> retrieve_similar_tests ->
//! retrieve_patterns -> generate_plan -> extract_test_cases ->
//! request_approval -> finalize`, with `handle_error` reached from any stage
//! that records an error. Stage failures stay inside the run state; only a
//! checkpoint that cannot be written fails the call itself.

use crate::adapter::types::{DiscoveryResult, TestCase, TestPriority};
use crate::approval::types::{ApprovalRequest, ApprovalStatus, ApprovalType};
use crate::approval::ApprovalManager;
use crate::config::types::ApprovalGate;
use crate::error::{ApprovalError, FailureKind};
use crate::pipeline::checkpoint::CheckpointLogger;
use crate::pipeline::extract::{extract_plan, CoverageAnalysis};
use crate::pipeline::generator::{PlanGenerator, PlanRequest};
use crate::pipeline::retriever::{KnowledgeRetriever, Metadata, RetrievedDocument};
use crate::pipeline::sanitize::InputSanitizer;
use crate::pipeline::state::{PlanningState, RunStatus, Stage};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SIMILAR_TESTS_K: usize = 5;
const PATTERNS_K: usize = 3;
const PLANNER_AGENT: &str = "test_planner";

pub struct PlanningPipeline {
    generator: Arc<dyn PlanGenerator>,
    sanitizer: InputSanitizer,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    approvals: Option<Arc<ApprovalManager>>,
    gate: ApprovalGate,
    checkpoints: Option<PathBuf>,
}

impl PlanningPipeline {
    pub fn new(generator: Arc<dyn PlanGenerator>, sanitizer: InputSanitizer) -> Self {
        Self {
            generator,
            sanitizer,
            retriever: None,
            approvals: None,
            gate: ApprovalGate::default(),
            checkpoints: None,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Enable the approval stage. Without this it passes straight through.
    pub fn with_approvals(mut self, manager: Arc<ApprovalManager>, gate: ApprovalGate) -> Self {
        self.approvals = Some(manager);
        self.gate = gate;
        self
    }

    /// Write a checkpoint per stage to `<dir>/<run_id>.jsonl`.
    pub fn with_checkpoints(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoints = Some(dir.into());
        self
    }

    /// Plan tests for `feature_description` of `app_name`.
    pub async fn run(
        &self,
        app_name: &str,
        feature_description: &str,
        discovery: Option<DiscoveryResult>,
    ) -> Result<PlanningState> {
        let mut state = PlanningState::new(app_name, feature_description);
        if let Some(discovery) = discovery {
            state = state.with_discovery(discovery);
        }
        info!(run = %state.run_id, app = app_name, "Starting planning run");
        self.drive(state).await
    }

    /// Continue a run from the stage after its last checkpoint. A finished
    /// run comes back unchanged.
    pub async fn resume(&self, state: PlanningState) -> Result<PlanningState> {
        if state.status.is_terminal() {
            return Ok(state);
        }
        info!(
            run = %state.run_id,
            after = %state.last_stage.map(|s| s.to_string()).unwrap_or_else(|| "start".into()),
            "Resuming planning run"
        );
        self.drive(state).await
    }

    async fn drive(&self, mut state: PlanningState) -> Result<PlanningState> {
        let mut log = match self.checkpoints {
            Some(ref dir) => Some(CheckpointLogger::open(dir, &state.run_id)?),
            None => None,
        };

        while let Some(stage) = state.next_stage() {
            debug!(run = %state.run_id, stage = %stage, "Entering stage");
            self.run_stage(stage, &mut state).await;
            state.last_stage = Some(stage);
            if let Some(ref mut log) = log {
                log.record(stage, &state)?;
            }
        }
        Ok(state)
    }

    async fn run_stage(&self, stage: Stage, state: &mut PlanningState) {
        match stage {
            Stage::Initialize => self.initialize(state),
            Stage::ValidateInput => self.validate_input(state),
            Stage::RetrieveSimilarTests => {
                let mut filters = Metadata::new();
                filters.insert("doc_type".into(), json!("test_case"));
                filters.insert("application".into(), json!(state.app_name));
                let found = self.retrieve(state, SIMILAR_TESTS_K, &filters).await;
                state.similar_tests = found;
                info!(count = state.similar_tests.len(), "Retrieved similar tests");
            }
            Stage::RetrievePatterns => {
                let mut filters = Metadata::new();
                filters.insert("doc_type".into(), json!("pattern"));
                let found = self.retrieve(state, PATTERNS_K, &filters).await;
                state.test_patterns = found;
                info!(count = state.test_patterns.len(), "Retrieved test patterns");
            }
            Stage::GeneratePlan => self.generate_plan(state).await,
            Stage::ExtractTestCases => extract_test_cases(state),
            Stage::RequestApproval => self.request_approval(state).await,
            Stage::Finalize => {
                state.finish(RunStatus::Completed, Utc::now());
                info!(
                    run = %state.run_id,
                    cases = state.test_cases.len(),
                    elapsed_secs = state.elapsed_seconds.unwrap_or(0.0),
                    "Planning completed"
                );
            }
            Stage::HandleError => {
                if state.error.as_deref().map_or(true, |e| e.trim().is_empty()) {
                    state.error = Some("Unknown error".to_string());
                }
                error!(
                    run = %state.run_id,
                    error = state.error.as_deref().unwrap_or_default(),
                    "Planning failed"
                );
                state.finish(RunStatus::Failed, Utc::now());
            }
        }
    }

    fn initialize(&self, state: &mut PlanningState) {
        if state.started_at.is_none() {
            state.started_at = Some(Utc::now());
        }
        state.status = RunStatus::InProgress;
        state.requires_approval = self.approvals.is_some();
    }

    fn validate_input(&self, state: &mut PlanningState) {
        if state.feature_description.trim().is_empty() {
            state.fail("Input validation failed: feature description is empty");
            return;
        }
        match self.sanitizer.sanitize(&state.feature_description) {
            Ok(clean) => {
                for warning in &clean.warnings {
                    warn!(run = %state.run_id, "Input validation: {}", warning);
                }
                if clean.text.is_empty() {
                    state.fail("Input validation failed: nothing left after sanitizing");
                    return;
                }
                state.feature_description = clean.text;
                state.input_warnings.extend(clean.warnings);
            }
            Err(e) => state.fail(format!("Input validation failed: {:#}", e)),
        }
    }

    async fn retrieve(
        &self,
        state: &PlanningState,
        k: usize,
        filters: &Metadata,
    ) -> Vec<RetrievedDocument> {
        let Some(ref retriever) = self.retriever else {
            return Vec::new();
        };
        match retriever
            .find_similar(&state.feature_description, k, filters)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                warn!(run = %state.run_id, error = %format!("{:#}", e), "Knowledge retrieval failed");
                Vec::new()
            }
        }
    }

    async fn generate_plan(&self, state: &mut PlanningState) {
        let request = PlanRequest {
            app_name: state.app_name.clone(),
            feature_description: state.feature_description.clone(),
            discovery_info: state.discovery.as_ref().map(|d| {
                let mut element_types: BTreeMap<&str, usize> = BTreeMap::new();
                for element in &d.elements {
                    *element_types.entry(element.kind.as_str()).or_default() += 1;
                }
                json!({
                    "total_elements": d.elements.len(),
                    "total_pages": d.pages.len(),
                    "element_types": element_types,
                })
            }),
            similar_tests: state.similar_tests.clone(),
            test_patterns: state.test_patterns.clone(),
        };

        match self.generator.generate(&request).await {
            Ok(plan) => {
                info!(run = %state.run_id, generator = self.generator.name(), "Test plan generated");
                state.test_plan = Some(plan);
            }
            Err(e) => state.fail(format!("Plan generation failed: {:#}", e)),
        }
    }

    async fn request_approval(&self, state: &mut PlanningState) {
        let Some(ref manager) = self.approvals else {
            debug!(run = %state.run_id, "Approvals not enabled, skipping");
            return;
        };

        let request = plan_approval_request(state);
        let outcome = match self.gate {
            ApprovalGate::Detached => manager.submit(request).await,
            ApprovalGate::Blocking => manager.request_approval(request).await,
        };

        match outcome {
            Ok(approval) => {
                info!(
                    run = %state.run_id,
                    approval = %approval.id,
                    status = %approval.status,
                    "Plan approval {}",
                    if approval.is_pending() { "requested" } else { "resolved" }
                );
                if approval.status == ApprovalStatus::Modified {
                    apply_reviewed_cases(&mut state.test_cases, approval.resolved_item());
                }
                state.approval_id = Some(approval.id);
                state.approval_status = Some(approval.status);
            }
            Err(e) => {
                state.approval_id = e.approval_id().map(str::to_string);
                state.approval_status = match e.kind() {
                    FailureKind::Denied => Some(ApprovalStatus::Rejected),
                    FailureKind::TimedOut => Some(ApprovalStatus::Timeout),
                    _ => None,
                };
                state.fail(approval_failure(&e));
            }
        }
    }
}

fn approval_failure(e: &ApprovalError) -> String {
    if e.is_recoverable() {
        e.to_string()
    } else {
        format!("Approval request failed: {}", e)
    }
}

fn extract_test_cases(state: &mut PlanningState) {
    let Some(ref plan) = state.test_plan else {
        return;
    };
    match extract_plan(&plan.response, &state.app_name, &state.feature_description) {
        Ok(extraction) => {
            if extraction.used_defaults {
                warn!(run = %state.run_id, "No test cases recognized in plan, using defaults");
            }
            info!(count = extraction.test_cases.len(), "Extracted test cases");
            state.test_cases = extraction.test_cases;
            state.coverage = Some(extraction.coverage);
        }
        Err(e) => {
            warn!(run = %state.run_id, error = %format!("{:#}", e), "Test case extraction failed");
            state.test_cases = Vec::new();
        }
    }
}

fn plan_approval_request(state: &PlanningState) -> ApprovalRequest {
    let summary = format!(
        "Test plan for {}: {}\nGenerated {} test cases",
        state.app_name,
        state.feature_description,
        state.test_cases.len()
    );
    let cases: Vec<Value> = state
        .test_cases
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "description": c.description,
                "priority": c.priority,
            })
        })
        .collect();
    let item_data = json!({
        "feature_description": state.feature_description,
        "app_name": state.app_name,
        "test_cases_count": state.test_cases.len(),
        "test_cases": cases,
        "test_plan": state.test_plan,
    });

    ApprovalRequest::new(
        ApprovalType::TestPlan,
        format!("plan-{}", state.app_name),
        item_data,
        summary,
    )
    .with_context("agent", PLANNER_AGENT)
    .with_context("app", state.app_name.clone())
}

/// Keep the cases a reviewer left in the plan, in their order, with any
/// edited name, description or priority.
fn apply_reviewed_cases(cases: &mut Vec<TestCase>, reviewed: &Value) {
    let Some(entries) = reviewed.get("test_cases").and_then(Value::as_array) else {
        return;
    };

    let mut kept = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(id) = entry.get("id").and_then(Value::as_str) else {
            continue;
        };
        let Some(mut case) = cases.iter().find(|c| c.id == id).cloned() else {
            continue;
        };
        if let Some(name) = entry.get("name").and_then(Value::as_str) {
            case.name = name.to_string();
        }
        if let Some(description) = entry.get("description").and_then(Value::as_str) {
            case.description = description.to_string();
        }
        if let Some(priority) = entry
            .get("priority")
            .and_then(Value::as_str)
            .and_then(TestPriority::from_str_loose)
        {
            case.priority = priority;
        }
        kept.push(case);
    }
    *cases = kept;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanStatistics {
    pub similar_tests_found: usize,
    pub patterns_retrieved: usize,
    pub test_cases_extracted: usize,
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub run_id: String,
    pub status: RunStatus,
    pub app_name: String,
    pub feature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    pub test_cases: Vec<TestCase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageAnalysis>,
    pub statistics: PlanStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanReport {
    pub fn from_state(state: &PlanningState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            status: state.status,
            app_name: state.app_name.clone(),
            feature: state.feature_description.clone(),
            plan: state.test_plan.as_ref().map(|p| p.response.clone()),
            test_cases: state.test_cases.clone(),
            coverage: state.coverage.clone(),
            statistics: PlanStatistics {
                similar_tests_found: state.similar_tests.len(),
                patterns_retrieved: state.test_patterns.len(),
                test_cases_extracted: state.test_cases.len(),
            },
            approval_id: state.approval_id.clone(),
            approval_status: state.approval_status,
            elapsed_seconds: state.elapsed_seconds,
            warnings: state.input_warnings.clone(),
            error: state.error.clone(),
        }
    }
}
