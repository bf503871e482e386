//! Persistence for feedback records.

use crate::feedback::types::{Feedback, FeedbackStatistics};
use crate::store::{JsonDir, StoreError};
use std::path::Path;
use tracing::debug;

/// Directory-backed feedback, one JSON file per feedback ID.
/// Records are created once and never overwritten.
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    dir: JsonDir,
}

impl FeedbackStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            dir: JsonDir::open(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    /// Persist a new record. Fails with `AlreadyExists` on a reused ID.
    pub fn save(&self, feedback: &Feedback) -> Result<(), StoreError> {
        self.dir.create(&feedback.id, feedback)?;
        debug!(id = %feedback.id, item = %feedback.item_id, "Saved feedback");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Feedback>, StoreError> {
        self.dir.read(id)
    }

    /// All feedback, oldest first, optionally restricted to one item type.
    pub fn all(&self, item_type: Option<&str>) -> Result<Vec<Feedback>, StoreError> {
        let mut records: Vec<Feedback> = self.dir.read_all()?;
        if let Some(kind) = item_type {
            records.retain(|fb| fb.item_type == kind);
        }
        records.sort_by(|a, b| a.provided_at.cmp(&b.provided_at));
        Ok(records)
    }

    pub fn for_item(&self, item_id: &str) -> Result<Vec<Feedback>, StoreError> {
        Ok(self
            .all(None)?
            .into_iter()
            .filter(|fb| fb.item_id == item_id)
            .collect())
    }

    pub fn false_positives(&self) -> Result<Vec<Feedback>, StoreError> {
        self.filtered(|fb| fb.is_false_positive)
    }

    pub fn false_negatives(&self) -> Result<Vec<Feedback>, StoreError> {
        self.filtered(|fb| fb.is_false_negative)
    }

    pub fn known_issues(&self) -> Result<Vec<Feedback>, StoreError> {
        self.filtered(|fb| fb.is_known_issue)
    }

    pub fn statistics(&self) -> Result<FeedbackStatistics, StoreError> {
        Ok(FeedbackStatistics::from_records(&self.all(None)?))
    }

    /// Every record rendered as a knowledge-base document.
    pub fn export_documents(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.all(None)?.iter().map(Feedback::to_document).collect())
    }

    fn filtered(&self, keep: impl Fn(&Feedback) -> bool) -> Result<Vec<Feedback>, StoreError> {
        Ok(self.all(None)?.into_iter().filter(|fb| keep(fb)).collect())
    }
}
