//! Collects human feedback on finished tests.

use crate::adapter::types::{TestResult, TestStatus};
use crate::approval::Reviewer;
use crate::feedback::store::FeedbackStore;
use crate::feedback::types::{Feedback, FeedbackDraft};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub const TEST_RESULT_ITEM: &str = "test_result";

/// Asks a reviewer about test results and stores what they say.
pub struct FeedbackCollector {
    store: Arc<FeedbackStore>,
    reviewer: Arc<dyn Reviewer>,
}

impl FeedbackCollector {
    pub fn new(store: Arc<FeedbackStore>, reviewer: Arc<dyn Reviewer>) -> Self {
        Self { store, reviewer }
    }

    pub fn store(&self) -> &Arc<FeedbackStore> {
        &self.store
    }

    /// The question asked when the caller supplies none.
    pub fn default_prompt(result: &TestResult) -> String {
        match result.status {
            TestStatus::Failed => format!("Test '{}' failed. Is this expected?", result.test_name),
            TestStatus::Passed => format!("Test '{}' passed. Any concerns?", result.test_name),
            _ => format!("Provide feedback on test '{}'", result.test_name),
        }
    }

    /// Ask for feedback on `result`. When the reviewer answers, the feedback
    /// is stored and `result` is marked as validated by a human.
    pub async fn collect_test_feedback(
        &self,
        result: &mut TestResult,
        prompt: Option<&str>,
    ) -> Result<Option<Feedback>> {
        let prompt = prompt
            .map(str::to_string)
            .unwrap_or_else(|| Self::default_prompt(result));

        let Some(draft) = self
            .reviewer
            .collect_feedback(result, &prompt)
            .await
            .with_context(|| format!("Failed to collect feedback for {}", result.id))?
        else {
            return Ok(None);
        };

        let feedback = self.submit(&result.id, TEST_RESULT_ITEM, draft)?;

        result.validated_by_human = true;
        result.human_comment = Some(feedback.comment.clone());
        result.is_false_positive = feedback.is_false_positive;
        result.is_false_negative = feedback.is_false_negative;
        Ok(Some(feedback))
    }

    /// Store feedback that arrived out of band (CLI, desk).
    pub fn submit(&self, item_id: &str, item_type: &str, draft: FeedbackDraft) -> Result<Feedback> {
        let feedback = Feedback::from_draft(item_id, item_type, draft)?;
        self.store
            .save(&feedback)
            .with_context(|| format!("Failed to save feedback {}", feedback.id))?;
        info!(id = %feedback.id, item = %item_id, kind = %item_type, "Feedback recorded");
        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::types::TestCase;
    use crate::approval::ScriptedReviewer;
    use tempfile::TempDir;

    fn failed_result() -> TestResult {
        let case = TestCase::new("login", "shop");
        let mut r = TestResult::errored(&case, "assertion failed");
        r.status = TestStatus::Failed;
        r
    }

    #[test]
    fn test_default_prompts() {
        let mut r = failed_result();
        assert_eq!(
            FeedbackCollector::default_prompt(&r),
            "Test 'login' failed. Is this expected?"
        );
        r.status = TestStatus::Passed;
        assert_eq!(
            FeedbackCollector::default_prompt(&r),
            "Test 'login' passed. Any concerns?"
        );
        r.status = TestStatus::Skipped;
        assert_eq!(
            FeedbackCollector::default_prompt(&r),
            "Provide feedback on test 'login'"
        );
    }

    #[tokio::test]
    async fn test_collect_marks_result() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FeedbackStore::open(tmp.path()).unwrap());
        let reviewer = ScriptedReviewer::silent().with_feedback([FeedbackDraft {
            rating: Some(2),
            comment: "selector changed".into(),
            is_false_positive: true,
            provided_by: "dana".into(),
            ..Default::default()
        }]);
        let collector = FeedbackCollector::new(Arc::clone(&store), Arc::new(reviewer));

        let mut result = failed_result();
        let fb = collector
            .collect_test_feedback(&mut result, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fb.item_id, result.id);
        assert_eq!(fb.item_type, "test_result");
        assert!(result.validated_by_human);
        assert!(result.is_false_positive);
        assert_eq!(result.human_comment.as_deref(), Some("selector changed"));
        assert_eq!(store.for_item(&result.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_answer_leaves_result_alone() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FeedbackStore::open(tmp.path()).unwrap());
        let collector = FeedbackCollector::new(store, Arc::new(ScriptedReviewer::silent()));

        let mut result = failed_result();
        assert!(collector
            .collect_test_feedback(&mut result, Some("anything?"))
            .await
            .unwrap()
            .is_none());
        assert!(!result.validated_by_human);
    }

    #[test]
    fn test_submit_rejects_bad_rating() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FeedbackStore::open(tmp.path()).unwrap());
        let collector = FeedbackCollector::new(Arc::clone(&store), Arc::new(ScriptedReviewer::silent()));

        let bad = FeedbackDraft {
            rating: Some(7),
            ..Default::default()
        };
        assert!(collector.submit("R-1", "test_result", bad).is_err());
        assert!(store.all(None).unwrap().is_empty());
    }
}
