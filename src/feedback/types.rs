//! Feedback records.

use crate::utils::ids::feedback_id;
use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Feedback as a reviewer supplies it, before it is bound to an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrections: Option<Value>,
    #[serde(default)]
    pub is_false_positive: bool,
    #[serde(default)]
    pub is_false_negative: bool,
    #[serde(default)]
    pub is_known_issue: bool,
    #[serde(default)]
    pub needs_investigation: bool,
    #[serde(default = "default_provider")]
    pub provided_by: String,
}

fn default_provider() -> String {
    "human".to_string()
}

/// A human judgment on a completed item. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub item_id: String,
    /// test_result, test_case, generated_code, ...
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrections: Option<Value>,
    #[serde(default)]
    pub is_false_positive: bool,
    #[serde(default)]
    pub is_false_negative: bool,
    #[serde(default)]
    pub is_known_issue: bool,
    #[serde(default)]
    pub needs_investigation: bool,
    pub provided_by: String,
    pub provided_at: DateTime<Utc>,
}

impl Feedback {
    /// Bind a draft to an item. Fails on a rating outside 1..=5.
    pub fn from_draft(
        item_id: impl Into<String>,
        item_type: impl Into<String>,
        draft: FeedbackDraft,
    ) -> Result<Self> {
        if let Some(rating) = draft.rating {
            ensure!(
                (MIN_RATING..=MAX_RATING).contains(&rating),
                "Rating must be between {} and {}, got {}",
                MIN_RATING,
                MAX_RATING,
                rating
            );
        }
        let provided_by = if draft.provided_by.trim().is_empty() {
            default_provider()
        } else {
            draft.provided_by
        };

        Ok(Self {
            id: feedback_id(),
            item_id: item_id.into(),
            item_type: item_type.into(),
            rating: draft.rating,
            comment: draft.comment,
            corrections: draft.corrections,
            is_false_positive: draft.is_false_positive,
            is_false_negative: draft.is_false_negative,
            is_known_issue: draft.is_known_issue,
            needs_investigation: draft.needs_investigation,
            provided_by,
            provided_at: Utc::now(),
        })
    }

    /// Plain-text form for feeding back into the knowledge base.
    pub fn to_document(&self) -> String {
        let rating = self
            .rating
            .map(|r| format!("{}/{}", r, MAX_RATING))
            .unwrap_or_else(|| "unrated".to_string());

        let mut doc = format!(
            "Feedback for {} {}:\nRating: {}\nComment: {}\nProvided by: {}\nDate: {}",
            self.item_type,
            self.item_id,
            rating,
            self.comment,
            self.provided_by,
            self.provided_at.to_rfc3339()
        );
        if let Some(ref corrections) = self.corrections {
            doc.push_str(&format!("\nSuggested corrections: {}", corrections));
        }
        if self.is_false_positive {
            doc.push_str("\nMarked as: FALSE POSITIVE");
        }
        if self.is_false_negative {
            doc.push_str("\nMarked as: FALSE NEGATIVE");
        }
        if self.is_known_issue {
            doc.push_str("\nMarked as: KNOWN ISSUE");
        }
        doc
    }
}

/// Aggregate view over stored feedback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStatistics {
    pub total_feedback: usize,
    pub by_type: BTreeMap<String, usize>,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub known_issues: usize,
    pub needs_investigation: usize,
    /// Mean of the rated records; 0.0 when nothing is rated.
    pub average_rating: f64,
}

impl FeedbackStatistics {
    pub fn from_records(records: &[Feedback]) -> Self {
        let mut stats = FeedbackStatistics {
            total_feedback: records.len(),
            ..Default::default()
        };

        let mut rating_sum = 0u32;
        let mut rated = 0u32;
        for fb in records {
            *stats.by_type.entry(fb.item_type.clone()).or_insert(0) += 1;
            stats.false_positives += fb.is_false_positive as usize;
            stats.false_negatives += fb.is_false_negative as usize;
            stats.known_issues += fb.is_known_issue as usize;
            stats.needs_investigation += fb.needs_investigation as usize;
            if let Some(r) = fb.rating {
                rating_sum += u32::from(r);
                rated += 1;
            }
        }
        if rated > 0 {
            stats.average_rating = f64::from(rating_sum) / f64::from(rated);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(rating: Option<u8>) -> FeedbackDraft {
        FeedbackDraft {
            rating,
            comment: "flaky on CI".into(),
            provided_by: "dana".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Feedback::from_draft("R-1", "test_result", draft(Some(1))).is_ok());
        assert!(Feedback::from_draft("R-1", "test_result", draft(Some(5))).is_ok());
        assert!(Feedback::from_draft("R-1", "test_result", draft(None)).is_ok());

        let err = Feedback::from_draft("R-1", "test_result", draft(Some(6))).unwrap_err();
        assert!(err.to_string().contains("between 1 and 5"));
        assert!(Feedback::from_draft("R-1", "test_result", draft(Some(0))).is_err());
    }

    #[test]
    fn test_blank_provider_defaults_to_human() {
        let mut d = draft(None);
        d.provided_by = " ".into();
        let fb = Feedback::from_draft("R-1", "test_result", d).unwrap();
        assert_eq!(fb.provided_by, "human");
        assert!(fb.id.starts_with("FB-"));
    }

    #[test]
    fn test_to_document_lists_flags() {
        let mut d = draft(Some(4));
        d.is_false_positive = true;
        d.is_known_issue = true;
        d.corrections = Some(json!({"expected": "200"}));
        let doc = Feedback::from_draft("R-9", "test_result", d)
            .unwrap()
            .to_document();

        assert!(doc.starts_with("Feedback for test_result R-9:"));
        assert!(doc.contains("Rating: 4/5"));
        assert!(doc.contains("Suggested corrections"));
        assert!(doc.contains("FALSE POSITIVE"));
        assert!(doc.contains("KNOWN ISSUE"));
        assert!(!doc.contains("FALSE NEGATIVE"));
    }

    #[test]
    fn test_statistics() {
        let mut a = Feedback::from_draft("R-1", "test_result", draft(Some(2))).unwrap();
        a.is_false_positive = true;
        let b = Feedback::from_draft("R-2", "test_result", draft(Some(4))).unwrap();
        let c = Feedback::from_draft("TC-1", "test_case", draft(None)).unwrap();

        let stats = FeedbackStatistics::from_records(&[a, b, c]);
        assert_eq!(stats.total_feedback, 3);
        assert_eq!(stats.by_type["test_result"], 2);
        assert_eq!(stats.by_type["test_case"], 1);
        assert_eq!(stats.false_positives, 1);
        assert!((stats.average_rating - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_statistics() {
        let stats = FeedbackStatistics::from_records(&[]);
        assert_eq!(stats.total_feedback, 0);
        assert_eq!(stats.average_rating, 0.0);
    }
}
