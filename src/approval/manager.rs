//! Approval orchestration.
//!
//! The manager applies the HITL policy, persists every request, hands it to
//! the configured reviewer and waits no longer than the approval's deadline.
//! Every transition is saved before the caller sees the outcome.

use crate::adapter::types::TestCase;
use crate::approval::policy::HitlMode;
use crate::approval::types::{
    Approval, ApprovalRequest, ApprovalStatus, ApprovalType, ReviewDecision, DEFAULT_TIMEOUT_SECS,
};
use crate::approval::{ConsoleReviewer, PollingReviewer, Reviewer, ScriptedReviewer};
use crate::config::types::{ReviewerKind, Settings};
use crate::error::ApprovalError;
use crate::store::{ApprovalStore, StoreError};
use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub const SYSTEM_APPROVER: &str = "system";

/// Requests approvals and turns their terminal states into results.
pub struct ApprovalManager {
    mode: HitlMode,
    default_timeout: u64,
    store: Arc<ApprovalStore>,
    reviewer: Arc<dyn Reviewer>,
}

impl ApprovalManager {
    pub fn new(mode: HitlMode, store: Arc<ApprovalStore>, reviewer: Arc<dyn Reviewer>) -> Self {
        Self {
            mode,
            default_timeout: DEFAULT_TIMEOUT_SECS,
            store,
            reviewer,
        }
    }

    /// Build a manager with the reviewer the settings ask for.
    pub fn from_settings(settings: &Settings, store: Arc<ApprovalStore>) -> Self {
        let reviewer: Arc<dyn Reviewer> = match settings.reviewer {
            ReviewerKind::Console => Arc::new(ConsoleReviewer::stdio()),
            ReviewerKind::Polling => Arc::new(
                PollingReviewer::new(Arc::clone(&store))
                    .with_poll_interval(settings.poll_interval()),
            ),
            ReviewerKind::AutoApprove => Arc::new(ScriptedReviewer::approve_all("auto")),
            ReviewerKind::AutoDeny => Arc::new(ScriptedReviewer::deny_all(
                "auto",
                "Denied by the auto-deny reviewer",
            )),
        };
        Self::new(settings.hitl_mode, store, reviewer)
            .with_default_timeout(settings.approval_timeout_secs)
    }

    pub fn with_default_timeout(mut self, timeout_seconds: u64) -> Self {
        self.default_timeout = timeout_seconds;
        self
    }

    pub fn mode(&self) -> HitlMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<ApprovalStore> {
        &self.store
    }

    pub fn reviewer_name(&self) -> &str {
        self.reviewer.name()
    }

    pub fn is_approval_required(&self, approval_type: ApprovalType) -> bool {
        self.mode.requires(approval_type)
    }

    /// Ask for a decision and wait for it.
    ///
    /// Returns the resolved record on APPROVED or MODIFIED. A rejection or an
    /// expired deadline comes back as [`ApprovalError::Denied`] or
    /// [`ApprovalError::TimedOut`]. When the mode does not require a human
    /// the record is approved by `system` at once and the reviewer is not
    /// consulted.
    pub async fn request_approval(&self, request: ApprovalRequest) -> Result<Approval, ApprovalError> {
        let approval = self.build(request)?;
        if !self.is_approval_required(approval.approval_type) {
            return self.auto_approve(approval);
        }

        self.store.save(&approval)?;
        info!(
            id = %approval.id,
            kind = %approval.approval_type,
            item = %approval.item_id,
            reviewer = self.reviewer.name(),
            timeout_secs = approval.timeout_seconds,
            "Approval requested"
        );

        let window = approval.time_remaining(Utc::now());
        let decision = match tokio::time::timeout(window, self.reviewer.review_approval(&approval))
            .await
        {
            Ok(Ok(decision)) => Some(decision),
            Ok(Err(e)) if approval.is_expired(Utc::now()) => {
                warn!(id = %approval.id, error = %e, "Review channel gave up at the deadline");
                None
            }
            Ok(Err(e)) => {
                // The record stays PENDING until it expires or someone decides
                warn!(id = %approval.id, error = %e, "Review channel failed");
                return Err(ApprovalError::Review(e));
            }
            Err(_) => None,
        };

        let resolved = self.settle(approval, decision)?;
        outcome(resolved)
    }

    /// Persist a request without waiting for anyone. Applies the same policy
    /// as [`request_approval`](Self::request_approval): a request that needs
    /// no human comes back already approved.
    pub async fn submit(&self, request: ApprovalRequest) -> Result<Approval, ApprovalError> {
        let approval = self.build(request)?;
        if !self.is_approval_required(approval.approval_type) {
            return self.auto_approve(approval);
        }
        self.store.save(&approval)?;
        info!(id = %approval.id, kind = %approval.approval_type, "Approval submitted");
        Ok(approval)
    }

    /// Current state of a submitted approval, stamping TIMEOUT if it expired.
    pub fn resolve(&self, id: &str) -> Result<Option<Approval>, StoreError> {
        self.store.get_observed(id, Utc::now())
    }

    pub fn get_approval(&self, id: &str) -> Result<Option<Approval>, StoreError> {
        self.store.get(id)
    }

    pub fn list_pending(&self) -> Result<Vec<Approval>, StoreError> {
        self.store.list_pending(Utc::now())
    }

    /// Ask for approval of a test plan; returns the plan to use.
    pub async fn approve_test_plan(&self, plan: Value, summary: &str) -> Result<Value, ApprovalError> {
        let item_id = plan
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let approval = self
            .request_approval(ApprovalRequest::new(
                ApprovalType::TestPlan,
                item_id,
                plan,
                summary,
            ))
            .await?;
        Ok(approval.resolved_item().clone())
    }

    /// Ask for approval of a single test case; returns the case to use.
    pub async fn approve_test_case(&self, case: TestCase) -> Result<TestCase, ApprovalError> {
        let item_data = serde_json::to_value(&case)
            .map_err(|e| ApprovalError::Validation(format!("test case is not serializable: {}", e)))?;
        let summary = if case.description.is_empty() {
            format!("Test: {}", case.name)
        } else {
            format!("Test: {} - {}", case.name, case.description)
        };

        let approval = self
            .request_approval(ApprovalRequest::new(
                ApprovalType::TestCase,
                case.id.clone(),
                item_data,
                summary,
            ))
            .await?;

        let mut approved = match approval.modified_item {
            Some(ref item) => serde_json::from_value::<TestCase>(item.clone()).map_err(|e| {
                ApprovalError::Validation(format!("modified test case is invalid: {}", e))
            })?,
            None => case,
        };
        approved.approved_by = approval.approved_by.clone();
        Ok(approved)
    }

    /// [`approve_test_plan`](Self::approve_test_plan) for synchronous callers.
    /// Runs its own single-threaded runtime, so it must not be called from
    /// inside an async context.
    pub fn approve_test_plan_blocking(&self, plan: Value, summary: &str) -> Result<Value, ApprovalError> {
        block_on(self.approve_test_plan(plan, summary))?
    }

    /// [`approve_test_case`](Self::approve_test_case) for synchronous callers.
    pub fn approve_test_case_blocking(&self, case: TestCase) -> Result<TestCase, ApprovalError> {
        block_on(self.approve_test_case(case))?
    }

    fn build(&self, request: ApprovalRequest) -> Result<Approval, ApprovalError> {
        if request.item_id.trim().is_empty() {
            return Err(ApprovalError::Validation("item_id must not be empty".into()));
        }
        let timeout = request.timeout_seconds.unwrap_or(self.default_timeout);
        if timeout == 0 {
            return Err(ApprovalError::Validation(
                "timeout_seconds must be greater than zero".into(),
            ));
        }

        Ok(Approval::new(
            request.approval_type,
            request.item_id,
            request.item_data,
            request.item_summary,
        )
        .with_timeout(timeout)
        .with_context(request.context))
    }

    fn auto_approve(&self, mut approval: Approval) -> Result<Approval, ApprovalError> {
        approval.approve(SYSTEM_APPROVER, Some("Auto-approved".to_string()))?;
        self.store.save(&approval)?;
        info!(
            id = %approval.id,
            kind = %approval.approval_type,
            mode = %self.mode,
            "Approval not required; auto-approved"
        );
        Ok(approval)
    }

    /// Bring the record to a terminal state and persist it.
    ///
    /// A decision already in the store wins over the one in hand: the
    /// polling reviewer reports decisions that were written there, and an
    /// external actor may have decided while a local reviewer was still
    /// prompting.
    fn settle(
        &self,
        requested: Approval,
        decision: Option<ReviewDecision>,
    ) -> Result<Approval, ApprovalError> {
        let mut current = self.store.get(&requested.id)?.unwrap_or(requested);
        if current.status.is_terminal() {
            return Ok(current);
        }

        match decision {
            Some(decision) => {
                info!(id = %current.id, action = decision.action(), "Applying review decision");
                decision.apply(&mut current)?;
            }
            None => {
                warn!(
                    id = %current.id,
                    timeout_secs = current.timeout_seconds,
                    "No decision before the deadline"
                );
                current.mark_timed_out()?;
            }
        }
        self.store.save(&current)?;
        Ok(current)
    }
}

fn outcome(approval: Approval) -> Result<Approval, ApprovalError> {
    match approval.status {
        ApprovalStatus::Approved | ApprovalStatus::Modified => Ok(approval),
        ApprovalStatus::Rejected => Err(ApprovalError::Denied {
            reason: approval
                .rejection_reason
                .clone()
                .unwrap_or_else(|| "No reason provided".to_string()),
            approval_id: approval.id,
        }),
        ApprovalStatus::Timeout => Err(ApprovalError::TimedOut {
            approval_id: approval.id,
            timeout_seconds: approval.timeout_seconds,
        }),
        ApprovalStatus::Pending => Err(ApprovalError::Validation(format!(
            "approval {} is still pending",
            approval.id
        ))),
    }
}

/// Drive `future` on a throwaway runtime. Blocking reviewer threads still
/// parked when it resolves are left behind instead of waited for.
fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, ApprovalError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start a runtime for the blocking approval")
        .map_err(ApprovalError::Review)?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        store: Arc<ApprovalStore>,
        reviewer: Arc<ScriptedReviewer>,
        manager: ApprovalManager,
    }

    fn fixture(mode: HitlMode, reviewer: ScriptedReviewer) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ApprovalStore::open(tmp.path()).unwrap());
        let reviewer = Arc::new(reviewer);
        let manager = ApprovalManager::new(mode, Arc::clone(&store), reviewer.clone());
        Fixture {
            _tmp: tmp,
            store,
            reviewer,
            manager,
        }
    }

    fn plan_request() -> ApprovalRequest {
        ApprovalRequest::new(
            ApprovalType::TestPlan,
            "plan-shop",
            json!({"id": "plan-shop", "priority": "high", "cases": 2}),
            "Test plan for shop",
        )
        .with_context("agent", "test_planner")
    }

    #[tokio::test]
    async fn test_full_auto_skips_reviewer() {
        let f = fixture(HitlMode::FullAuto, ScriptedReviewer::silent());
        let approval = f.manager.request_approval(plan_request()).await.unwrap();

        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert_eq!(approval.approved_by.as_deref(), Some("system"));
        assert_eq!(f.reviewer.calls(), 0);
        // Synthetic approvals are persisted too
        assert_eq!(f.store.get(&approval.id).unwrap(), Some(approval));
    }

    #[tokio::test]
    async fn test_not_required_type_is_auto_approved() {
        let f = fixture(HitlMode::ApprovePlan, ScriptedReviewer::silent());
        let request = ApprovalRequest::new(ApprovalType::TestCase, "tc-1", json!({}), "case");
        let approval = f.manager.request_approval(request).await.unwrap();
        assert_eq!(approval.approved_by.as_deref(), Some("system"));
        assert_eq!(f.reviewer.calls(), 0);
    }

    #[tokio::test]
    async fn test_approval_persisted_and_returned() {
        let f = fixture(HitlMode::ApprovePlan, ScriptedReviewer::approve_all("alice"));
        let approval = f.manager.request_approval(plan_request()).await.unwrap();

        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert_eq!(approval.approved_by.as_deref(), Some("alice"));
        assert_eq!(approval.context["agent"], "test_planner");
        assert_eq!(f.store.get(&approval.id).unwrap().unwrap().status, ApprovalStatus::Approved);
        assert_eq!(f.reviewer.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_denied_failure() {
        let f = fixture(
            HitlMode::ApproveAll,
            ScriptedReviewer::deny_all("bob", "needs more coverage"),
        );
        let err = f.manager.request_approval(plan_request()).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Denied);
        assert!(err.is_recoverable());
        match err {
            ApprovalError::Denied { approval_id, reason } => {
                assert_eq!(reason, "needs more coverage");
                let stored = f.store.get(&approval_id).unwrap().unwrap();
                assert_eq!(stored.status, ApprovalStatus::Rejected);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout_and_stamps_record() {
        let f = fixture(HitlMode::Interactive, ScriptedReviewer::silent());
        let err = f
            .manager
            .request_approval(plan_request().with_timeout(1))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::TimedOut);
        assert_eq!(err.to_string(), "Approval timed out after 1 seconds");
        let id = err.approval_id().unwrap().to_string();
        assert_eq!(f.store.get(&id).unwrap().unwrap().status, ApprovalStatus::Timeout);
        assert!(f.manager.list_pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_decision_from_reviewer() {
        let f = fixture(
            HitlMode::Interactive,
            ScriptedReviewer::new([ReviewDecision::Timeout]),
        );
        let err = f.manager.request_approval(plan_request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TimedOut);
    }

    #[tokio::test]
    async fn test_external_decision_wins() {
        let f = fixture(
            HitlMode::Interactive,
            ScriptedReviewer::approve_all("late-console").with_delay(Duration::from_millis(150)),
        );

        // Somebody rejects through the store while the reviewer is still busy
        let store = Arc::clone(&f.store);
        let rejecter = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if let Some(mut pending) = store.list_pending(Utc::now()).unwrap().pop() {
                    pending.reject("desk", "wrong feature").unwrap();
                    store.save(&pending).unwrap();
                    break;
                }
            }
        });

        let err = f.manager.request_approval(plan_request()).await.unwrap_err();
        rejecter.await.unwrap();
        match err {
            ApprovalError::Denied { reason, .. } => assert_eq!(reason, "wrong feature"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approve_test_plan_returns_modified_item() {
        let modified = json!({"id": "plan-shop", "priority": "critical", "cases": 2});
        let f = fixture(
            HitlMode::ApprovePlan,
            ScriptedReviewer::new([ReviewDecision::Modify {
                approver: "carol".into(),
                modifications: json!({"priority": "critical"}),
                modified_item: Some(modified.clone()),
                comments: None,
            }]),
        );
        let plan = json!({"id": "plan-shop", "priority": "high", "cases": 2});
        let resolved = f.manager.approve_test_plan(plan, "plan").await.unwrap();
        assert_eq!(resolved, modified);
    }

    #[tokio::test]
    async fn test_approve_test_case_applies_patch() {
        let f = fixture(
            HitlMode::ApproveTests,
            ScriptedReviewer::new([ReviewDecision::Modify {
                approver: "carol".into(),
                modifications: json!({"priority": "critical"}),
                modified_item: None,
                comments: None,
            }]),
        );
        let case = TestCase::new("login", "shop");
        let approved = f.manager.approve_test_case(case.clone()).await.unwrap();
        assert_eq!(approved.id, case.id);
        assert_eq!(approved.priority, crate::adapter::types::TestPriority::Critical);
        assert_eq!(approved.approved_by.as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn test_submit_does_not_wait() {
        let f = fixture(HitlMode::ApprovePlan, ScriptedReviewer::silent());
        let submitted = f.manager.submit(plan_request()).await.unwrap();
        assert_eq!(submitted.status, ApprovalStatus::Pending);
        assert_eq!(f.reviewer.calls(), 0);

        let pending = f.manager.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            f.manager.resolve(&submitted.id).unwrap().unwrap().status,
            ApprovalStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_reviewer_failure_leaves_record_pending() {
        struct Broken;
        #[async_trait::async_trait]
        impl Reviewer for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            async fn review_approval(&self, _: &Approval) -> anyhow::Result<ReviewDecision> {
                anyhow::bail!("channel down")
            }
            async fn collect_feedback(
                &self,
                _: &crate::adapter::types::TestResult,
                _: &str,
            ) -> anyhow::Result<Option<crate::feedback::types::FeedbackDraft>> {
                Ok(None)
            }
        }

        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ApprovalStore::open(tmp.path()).unwrap());
        let manager = ApprovalManager::new(HitlMode::Interactive, Arc::clone(&store), Arc::new(Broken));

        let err = manager.request_approval(plan_request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Channel);
        assert!(!err.is_recoverable());
        assert_eq!(manager.list_pending().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let f = fixture(HitlMode::Interactive, ScriptedReviewer::silent());
        let err = f
            .manager
            .request_approval(ApprovalRequest::new(ApprovalType::TestPlan, " ", json!({}), "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);

        let err = f
            .manager
            .request_approval(plan_request().with_timeout(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
    }

    #[test]
    fn test_blocking_wrapper() {
        let f = fixture(HitlMode::FullAuto, ScriptedReviewer::silent());
        let plan = json!({"id": "p1", "cases": []});
        let resolved = f
            .manager
            .approve_test_plan_blocking(plan.clone(), "plan")
            .unwrap();
        assert_eq!(resolved, plan);
    }
}
