//! Reviewer that replays canned answers.
//!
//! Used for unattended runs (approve or deny everything) and in tests.

use crate::adapter::types::TestResult;
use crate::approval::types::{Approval, ReviewDecision};
use crate::approval::Reviewer;
use crate::feedback::types::FeedbackDraft;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Answers approvals from a queue, then from a fallback decision. With an
/// empty queue and no fallback it never answers, like an absent human.
pub struct ScriptedReviewer {
    decisions: Mutex<VecDeque<ReviewDecision>>,
    fallback: Option<ReviewDecision>,
    feedback: Mutex<VecDeque<FeedbackDraft>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedReviewer {
    pub fn new(decisions: impl IntoIterator<Item = ReviewDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            fallback: None,
            feedback: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Approve everything (unattended CI runs).
    pub fn approve_all(approver: impl Into<String>) -> Self {
        Self::new(Vec::<ReviewDecision>::new()).with_fallback(ReviewDecision::Approve {
            approver: approver.into(),
            comments: None,
        })
    }

    /// Reject everything (strict CI runs).
    pub fn deny_all(approver: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(Vec::<ReviewDecision>::new()).with_fallback(ReviewDecision::Reject {
            approver: approver.into(),
            reason: reason.into(),
        })
    }

    /// Never answer.
    pub fn silent() -> Self {
        Self::new(Vec::<ReviewDecision>::new())
    }

    pub fn with_fallback(mut self, decision: ReviewDecision) -> Self {
        self.fallback = Some(decision);
        self
    }

    pub fn with_feedback(mut self, drafts: impl IntoIterator<Item = FeedbackDraft>) -> Self {
        self.feedback = Mutex::new(drafts.into_iter().collect());
        self
    }

    /// Wait this long before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of approval reviews requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn review_approval(&self, _approval: &Approval) -> Result<ReviewDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.decisions.lock().await.pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(decision) => Ok(decision),
            None => std::future::pending().await,
        }
    }

    async fn collect_feedback(
        &self,
        _result: &TestResult,
        _prompt: &str,
    ) -> Result<Option<FeedbackDraft>> {
        Ok(self.feedback.lock().await.pop_front())
    }
}
