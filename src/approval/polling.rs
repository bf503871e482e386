//! Reviewer that waits for somebody else to decide.
//!
//! The request is left in the approval store and the reviewer watches the
//! record until it leaves PENDING. Any process that can write the store (the
//! desk server, an operator's CLI) can make the decision.

use crate::adapter::types::TestResult;
use crate::approval::types::{Approval, ReviewDecision};
use crate::approval::Reviewer;
use crate::feedback::types::FeedbackDraft;
use crate::store::ApprovalStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Watches the store for a decision, re-reading on every poll tick and on
/// every in-process save notification.
pub struct PollingReviewer {
    store: Arc<ApprovalStore>,
    poll_interval: Duration,
}

impl PollingReviewer {
    pub fn new(store: Arc<ApprovalStore>) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        // interval() panics on zero
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The decision recorded for `id`, or `None` while it is still PENDING.
    /// A record that fails to parse is treated as still undecided: a writer
    /// outside this process may be mid-way through replacing it.
    fn check(&self, id: &str) -> Result<Option<ReviewDecision>> {
        match self.store.get(id) {
            Ok(Some(record)) => Ok(ReviewDecision::from_resolved(&record)),
            Ok(None) => bail!("Approval {} disappeared from the store while waiting", id),
            Err(e) if e.is_corrupt() => {
                warn!(id = %id, error = %e, "Unreadable approval record; still waiting");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Reviewer for PollingReviewer {
    fn name(&self) -> &str {
        "polling"
    }

    async fn review_approval(&self, approval: &Approval) -> Result<ReviewDecision> {
        // Never overwrite: a decision may already have landed
        match self.store.get(&approval.id) {
            Ok(None) => self.store.save(approval)?,
            Ok(Some(_)) => {}
            Err(e) if e.is_corrupt() => {}
            Err(e) => return Err(e.into()),
        }

        let mut updates = self.store.subscribe();
        let mut notifications_open = true;
        let deadline = Instant::now() + approval.time_remaining(Utc::now());
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            id = %approval.id,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Waiting for an external decision"
        );

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    // One last look before giving up
                    return Ok(self.check(&approval.id)?.unwrap_or(ReviewDecision::Timeout));
                }
                _ = ticker.tick() => {}
                changed = updates.recv(), if notifications_open => {
                    match changed {
                        Ok(id) if id != approval.id => continue,
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => {
                            notifications_open = false;
                            continue;
                        }
                    }
                }
            }

            if let Some(decision) = self.check(&approval.id)? {
                debug!(id = %approval.id, action = decision.action(), "Decision observed");
                return Ok(decision);
            }
        }
    }

    async fn collect_feedback(
        &self,
        _result: &TestResult,
        _prompt: &str,
    ) -> Result<Option<FeedbackDraft>> {
        // Feedback through the store is submitted out of band
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::types::ApprovalType;
    use serde_json::json;
    use tempfile::TempDir;

    fn approval(timeout: u64) -> Approval {
        Approval::new(ApprovalType::TestPlan, "plan-1", json!({"a": 1}), "plan").with_timeout(timeout)
    }

    #[tokio::test]
    async fn test_sees_decision_from_another_process() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ApprovalStore::open(tmp.path()).unwrap());
        let reviewer =
            PollingReviewer::new(Arc::clone(&store)).with_poll_interval(Duration::from_millis(20));
        let a = approval(30);

        // A separately opened store shares no notification channel
        let other = ApprovalStore::open(tmp.path()).unwrap();
        let id = a.id.clone();
        let decider = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let mut record = other.get(&id).unwrap().unwrap();
            record.approve("web-user", Some("ok".into())).unwrap();
            other.save(&record).unwrap();
        });

        let decision = reviewer.review_approval(&a).await.unwrap();
        decider.await.unwrap();
        assert_eq!(
            decision,
            ReviewDecision::Approve {
                approver: "web-user".into(),
                comments: Some("ok".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_notification_wakes_before_poll() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ApprovalStore::open(tmp.path()).unwrap());
        let reviewer =
            PollingReviewer::new(Arc::clone(&store)).with_poll_interval(Duration::from_secs(3600));
        let a = approval(3600);

        let writer = Arc::clone(&store);
        let id = a.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut record = writer.get(&id).unwrap().unwrap();
            record.reject("ops", "freeze").unwrap();
            writer.save(&record).unwrap();
        });

        let decision = tokio::time::timeout(Duration::from_secs(5), reviewer.review_approval(&a))
            .await
            .expect("notification should wake the reviewer")
            .unwrap();
        assert_eq!(decision.action(), "reject");
    }

    #[tokio::test]
    async fn test_times_out_without_decision() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ApprovalStore::open(tmp.path()).unwrap());
        let reviewer = PollingReviewer::new(store).with_poll_interval(Duration::from_millis(50));

        let decision = reviewer.review_approval(&approval(1)).await.unwrap();
        assert_eq!(decision, ReviewDecision::Timeout);
    }

    #[tokio::test]
    async fn test_corrupt_record_keeps_waiting() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ApprovalStore::open(tmp.path()).unwrap());
        let reviewer =
            PollingReviewer::new(Arc::clone(&store)).with_poll_interval(Duration::from_millis(20));
        let a = approval(30);
        store.save(&a).unwrap();

        let path = tmp.path().join(format!("{}.json", a.id));
        let mut fixed = a.clone();
        fixed
            .modify("ops", json!({"priority": "critical"}), None, None)
            .unwrap();
        let other = ApprovalStore::open(tmp.path()).unwrap();
        tokio::spawn(async move {
            std::fs::write(&path, "{ half written").unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            other.save(&fixed).unwrap();
        });

        let decision = reviewer.review_approval(&a).await.unwrap();
        assert_eq!(decision.action(), "modify");
    }

    #[tokio::test]
    async fn test_does_not_overwrite_existing_decision() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ApprovalStore::open(tmp.path()).unwrap());
        let reviewer = PollingReviewer::new(Arc::clone(&store));

        let a = approval(30);
        let mut decided = a.clone();
        decided.approve("early-bird", None).unwrap();
        store.save(&decided).unwrap();

        // Caller still holds the stale PENDING copy
        let decision = reviewer.review_approval(&a).await.unwrap();
        assert_eq!(decision.action(), "approve");
    }
}
