//! Error types for the approval workflow.
//!
//! Rejection and timeout are ordinary outcomes of asking a human, so they are
//! returned as values tagged with a [`FailureKind`] that callers match on.

use crate::approval::types::ApprovalStatus;
use crate::store::StoreError;
use thiserror::Error;

/// A transition that the approval state machine refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("approval {id} already {status}")]
    AlreadyResolved { id: String, status: ApprovalStatus },

    #[error("a rejection requires a non-empty reason")]
    EmptyReason,

    #[error("a modification requires a non-empty patch")]
    EmptyModifications,
}

/// Coarse classification of an [`ApprovalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A reviewer rejected the item.
    Denied,
    /// Nobody decided before the deadline.
    TimedOut,
    /// The request itself was malformed.
    Validation,
    /// The approval store could not be read or written.
    Persistence,
    /// The review channel failed to deliver a decision.
    Channel,
}

/// Failure of a blocking approval request.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval rejected: {reason}")]
    Denied { approval_id: String, reason: String },

    #[error("Approval timed out after {timeout_seconds} seconds")]
    TimedOut {
        approval_id: String,
        timeout_seconds: u64,
    },

    #[error("invalid approval request: {0}")]
    Validation(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("approval store error: {0}")]
    Store(#[from] StoreError),

    #[error("review channel failed: {0:#}")]
    Review(anyhow::Error),
}

impl ApprovalError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ApprovalError::Denied { .. } => FailureKind::Denied,
            ApprovalError::TimedOut { .. } => FailureKind::TimedOut,
            ApprovalError::Validation(_) | ApprovalError::Transition(_) => FailureKind::Validation,
            ApprovalError::Store(_) => FailureKind::Persistence,
            ApprovalError::Review(_) => FailureKind::Channel,
        }
    }

    /// Denials and timeouts abandon the current item only.
    /// Everything else points at a broken environment.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), FailureKind::Denied | FailureKind::TimedOut)
    }

    /// ID of the approval record this failure refers to, if one was created.
    pub fn approval_id(&self) -> Option<&str> {
        match self {
            ApprovalError::Denied { approval_id, .. }
            | ApprovalError::TimedOut { approval_id, .. } => Some(approval_id),
            _ => None,
        }
    }
}
