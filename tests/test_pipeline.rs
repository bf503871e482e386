//! Planning runs against files on disk: plan, knowledge base, approvals and
//! checkpoints together.

use regent::approval::{ApprovalManager, ApprovalStatus, HitlMode, ScriptedReviewer};
use regent::config::ApprovalGate;
use regent::desk::ApprovalDesk;
use regent::pipeline::{
    CheckpointReader, FilePlanGenerator, InMemoryRetriever, InputSanitizer, PlanReport,
    PlanningPipeline, RunStatus, Stage,
};
use regent::store::ApprovalStore;
use std::sync::Arc;
use tempfile::TempDir;

const PLAN: &str = "\
# Checkout test plan

## Test Cases

### Pay with a saved card
Priority: high
Type: functional
Description: A returning customer pays with the card on file.
Preconditions:
- Customer has a saved card
Steps:
1. Open the cart
2. Choose the saved card
3. Confirm the order

### Reject an expired card
Priority: critical
Type: negative
Steps:
1. Enter an expired card
2. Confirm the order

## Coverage Gaps
- Refunds are not covered
";

const KNOWLEDGE: &str = "\
- content: Checkout with saved card succeeds
  metadata:
    doc_type: test_case
    application: shop
- content: Checkout as guest user
  metadata:
    doc_type: test_case
    application: other-shop
- content: Payment forms need boundary values for card expiry
  metadata:
    doc_type: pattern
";

struct Workspace {
    tmp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("plan.md"), PLAN).unwrap();
        std::fs::write(tmp.path().join("knowledge.yaml"), KNOWLEDGE).unwrap();
        Self { tmp }
    }

    fn pipeline(&self) -> PlanningPipeline {
        let retriever = InMemoryRetriever::from_file(self.tmp.path().join("knowledge.yaml")).unwrap();
        PlanningPipeline::new(
            Arc::new(FilePlanGenerator::new(self.tmp.path().join("plan.md"))),
            InputSanitizer::new(10_000, false).unwrap(),
        )
        .with_retriever(Arc::new(retriever))
        .with_checkpoints(self.runs_dir())
    }

    fn runs_dir(&self) -> std::path::PathBuf {
        self.tmp.path().join("runs")
    }

    fn store(&self) -> Arc<ApprovalStore> {
        Arc::new(ApprovalStore::open(self.tmp.path().join("approvals")).unwrap())
    }
}

#[tokio::test]
async fn test_plan_file_to_report() {
    let ws = Workspace::new();
    let state = ws
        .pipeline()
        .run("shop", "Checkout with a saved card", None)
        .await
        .unwrap();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.similar_tests.len(), 1);
    assert_eq!(state.test_patterns.len(), 1);

    let report = PlanReport::from_state(&state);
    assert_eq!(report.statistics.test_cases_extracted, 2);
    assert_eq!(report.test_cases[0].name, "Pay with a saved card");
    assert_eq!(report.test_cases[0].steps.len(), 3);
    assert_eq!(report.test_cases[1].name, "Reject an expired card");
    assert!(report.coverage.unwrap().gaps.contains("Refunds"));
    assert!(report.error.is_none());
}

#[tokio::test]
async fn test_detached_approval_decided_later() {
    let ws = Workspace::new();
    let store = ws.store();
    let manager = Arc::new(ApprovalManager::new(
        HitlMode::ApprovePlan,
        store.clone(),
        Arc::new(ScriptedReviewer::silent()),
    ));

    let state = ws
        .pipeline()
        .with_approvals(manager.clone(), ApprovalGate::Detached)
        .run("shop", "Checkout with a saved card", None)
        .await
        .unwrap();

    // The run does not wait for the human.
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.approval_status, Some(ApprovalStatus::Pending));
    let id = state.approval_id.clone().unwrap();

    let desk = ApprovalDesk::new(store);
    let pending = desk.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].item_id, "plan-shop");
    assert!(pending[0].item_summary.contains("Generated 2 test cases"));

    desk.approve(&id, "alice", None).unwrap();
    let resolved = manager.resolve(&id).unwrap().unwrap();
    assert_eq!(resolved.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn test_blocking_rejection_fails_run() {
    let ws = Workspace::new();
    let manager = Arc::new(ApprovalManager::new(
        HitlMode::ApprovePlan,
        ws.store(),
        Arc::new(ScriptedReviewer::deny_all("bob", "missing refund cases")),
    ));

    let state = ws
        .pipeline()
        .with_approvals(manager, ApprovalGate::Blocking)
        .run("shop", "Checkout with a saved card", None)
        .await
        .unwrap();

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.approval_status, Some(ApprovalStatus::Rejected));
    assert_eq!(
        state.error.as_deref(),
        Some("Approval rejected: missing refund cases")
    );
    assert_eq!(state.last_stage, Some(Stage::HandleError));
}

#[tokio::test]
async fn test_missing_plan_file_fails_run() {
    let ws = Workspace::new();
    std::fs::remove_file(ws.tmp.path().join("plan.md")).unwrap();

    let state = ws
        .pipeline()
        .run("shop", "Checkout with a saved card", None)
        .await
        .unwrap();

    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.test_cases.is_empty());
    assert!(state.error.unwrap().contains("plan"));
}

#[tokio::test]
async fn test_resume_from_checkpoint() {
    let ws = Workspace::new();
    let first = ws
        .pipeline()
        .run("shop", "Checkout with a saved card", None)
        .await
        .unwrap();

    let reader = CheckpointReader::new(ws.runs_dir());
    let checkpoints = reader.read_run(&first.run_id).unwrap();
    let stages: Vec<Stage> = checkpoints.iter().map(|c| c.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Initialize,
            Stage::ValidateInput,
            Stage::RetrieveSimilarTests,
            Stage::RetrievePatterns,
            Stage::GeneratePlan,
            Stage::ExtractTestCases,
            Stage::RequestApproval,
            Stage::Finalize,
        ]
    );

    // Pretend the process died right after generating the plan.
    let interrupted = checkpoints[4].state.clone();
    assert_eq!(interrupted.status, RunStatus::InProgress);
    assert!(interrupted.test_cases.is_empty());

    let resumed = ws.pipeline().resume(interrupted).await.unwrap();
    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.run_id, first.run_id);
    assert_eq!(resumed.test_cases.len(), 2);

    let summary = reader.latest_run().unwrap().unwrap();
    assert_eq!(summary.run_id, first.run_id);
    assert_eq!(summary.stages, 11);
    assert_eq!(summary.status, RunStatus::Completed);
}
