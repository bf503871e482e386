//! Human-in-the-loop approvals.
//!
//! A [`Reviewer`] is the channel through which a human decides on an
//! [`Approval`]. The [`ApprovalManager`] decides whether a human is needed at
//! all, persists the request, and waits on the configured reviewer.

pub mod console;
pub mod manager;
pub mod policy;
pub mod polling;
pub mod scripted;
pub mod types;

use crate::adapter::types::TestResult;
use crate::feedback::types::FeedbackDraft;
use anyhow::Result;
use async_trait::async_trait;

pub use console::ConsoleReviewer;
pub use manager::ApprovalManager;
pub use policy::HitlMode;
pub use polling::PollingReviewer;
pub use scripted::ScriptedReviewer;
pub use types::{Approval, ApprovalRequest, ApprovalStatus, ApprovalType, ReviewDecision};

/// A channel that turns an approval request into a human decision.
///
/// Implementations may block for as long as the human takes. The manager
/// bounds the wait with the approval's own deadline.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Short name for logs ("console", "polling", ...).
    fn name(&self) -> &str;

    async fn review_approval(&self, approval: &Approval) -> Result<ReviewDecision>;

    /// Ask for feedback on a finished test. `None` when the reviewer has
    /// nothing to say or the channel cannot ask.
    async fn collect_feedback(
        &self,
        result: &TestResult,
        prompt: &str,
    ) -> Result<Option<FeedbackDraft>>;
}
