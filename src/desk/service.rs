//! Decisions taken outside the requesting process.
//!
//! [`ApprovalDesk`] is what a dashboard, the CLI or the socket server uses
//! to list and resolve approvals. It works on the shared store only; a
//! waiting [`PollingReviewer`](crate::approval::PollingReviewer) picks the
//! decision up from there.

use crate::approval::types::{Approval, ApprovalStatus, ApprovalType};
use crate::error::TransitionError;
use crate::store::{ApprovalStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const RECENT_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("approval '{0}' not found")]
    NotFound(String),

    #[error("approval '{id}' is already {status}")]
    AlreadyResolved { id: String, status: ApprovalStatus },

    #[error("approval '{0}' has expired")]
    Expired(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Store(StoreError),
}

impl DeskError {
    /// HTTP-style status carried in desk responses.
    pub fn status_code(&self) -> u16 {
        match self {
            DeskError::NotFound(_) => 404,
            DeskError::AlreadyResolved { .. } => 409,
            DeskError::Expired(_) => 410,
            DeskError::Invalid(_) => 400,
            DeskError::Store(_) => 500,
        }
    }
}

impl From<StoreError> for DeskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidId(id) => DeskError::Invalid(format!("invalid approval id '{}'", id)),
            other => DeskError::Store(other),
        }
    }
}

impl From<TransitionError> for DeskError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::AlreadyResolved { id, status } => {
                DeskError::AlreadyResolved { id, status }
            }
            other => DeskError::Invalid(other.to_string()),
        }
    }
}

/// A pending approval as listed to a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSummary {
    pub id: String,
    pub approval_type: ApprovalType,
    pub item_id: String,
    pub item_summary: String,
    pub requested_at: DateTime<Utc>,
    pub timeout_seconds: u64,
    pub time_remaining_seconds: u64,
}

impl PendingSummary {
    fn of(approval: &Approval, now: DateTime<Utc>) -> Self {
        Self {
            id: approval.id.clone(),
            approval_type: approval.approval_type,
            item_id: approval.item_id.clone(),
            item_summary: approval.item_summary.clone(),
            requested_at: approval.requested_at,
            timeout_seconds: approval.timeout_seconds,
            time_remaining_seconds: approval.time_remaining(now).as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentDecision {
    pub id: String,
    pub approval_type: ApprovalType,
    pub status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeskStatistics {
    pub total: usize,
    pub by_status: BTreeMap<ApprovalStatus, usize>,
    pub by_type: BTreeMap<ApprovalType, usize>,
    /// Mean seconds from request to decision over decided records.
    pub average_decision_seconds: Option<f64>,
    /// Latest decisions, newest first.
    pub recent: Vec<RecentDecision>,
}

pub struct ApprovalDesk {
    store: Arc<ApprovalStore>,
}

impl ApprovalDesk {
    pub fn new(store: Arc<ApprovalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ApprovalStore> {
        &self.store
    }

    /// Pending approvals that have not expired, newest first.
    pub fn pending(&self) -> Result<Vec<PendingSummary>, DeskError> {
        let now = Utc::now();
        Ok(self
            .store
            .list_pending(now)?
            .iter()
            .map(|a| PendingSummary::of(a, now))
            .collect())
    }

    /// Full record. An expired PENDING record is stamped TIMEOUT first.
    pub fn detail(&self, id: &str) -> Result<Approval, DeskError> {
        self.store
            .get_observed(id, Utc::now())?
            .ok_or_else(|| DeskError::NotFound(id.to_string()))
    }

    pub fn approve(
        &self,
        id: &str,
        approver: &str,
        comments: Option<String>,
    ) -> Result<Approval, DeskError> {
        self.decide(id, approver, |a| a.approve(approver, comments))
    }

    pub fn reject(&self, id: &str, approver: &str, reason: &str) -> Result<Approval, DeskError> {
        self.decide(id, approver, |a| a.reject(approver, reason))
    }

    /// Resolve as MODIFIED with `modifications` merged over the item.
    pub fn modify(
        &self,
        id: &str,
        approver: &str,
        modifications: Value,
        comments: Option<String>,
    ) -> Result<Approval, DeskError> {
        if !modifications.as_object().is_some_and(|m| !m.is_empty()) {
            return Err(DeskError::Invalid(
                "modifications must be a non-empty JSON object".into(),
            ));
        }
        self.decide(id, approver, |a| a.modify(approver, modifications, None, comments))
    }

    /// Stamp every expired PENDING record as TIMEOUT.
    pub fn sweep(&self) -> Result<Vec<Approval>, DeskError> {
        let swept = self.store.sweep_expired(Utc::now())?;
        if !swept.is_empty() {
            info!(count = swept.len(), "Expired approvals marked as timed out");
        }
        Ok(swept)
    }

    /// Counts over every record. Expired PENDING records are stamped TIMEOUT
    /// first, so the figures match what a later read of each record sees.
    pub fn statistics(&self) -> Result<DeskStatistics, DeskError> {
        let now = Utc::now();
        self.store.sweep_expired(now)?;
        let all = self.store.list()?;
        let mut stats = DeskStatistics {
            total: all.len(),
            ..DeskStatistics::default()
        };

        let mut latencies = Vec::new();
        for approval in &all {
            *stats
                .by_status
                .entry(approval.effective_status(now))
                .or_default() += 1;
            *stats.by_type.entry(approval.approval_type).or_default() += 1;

            if let Some(decided) = approval.approved_at {
                latencies.push((decided - approval.requested_at).num_milliseconds() as f64 / 1000.0);
                stats.recent.push(RecentDecision {
                    id: approval.id.clone(),
                    approval_type: approval.approval_type,
                    status: approval.status,
                    approved_by: approval.approved_by.clone(),
                    approved_at: decided,
                });
            }
        }

        if !latencies.is_empty() {
            stats.average_decision_seconds =
                Some(latencies.iter().sum::<f64>() / latencies.len() as f64);
        }
        stats.recent.sort_by(|a, b| b.approved_at.cmp(&a.approved_at));
        stats.recent.truncate(RECENT_LIMIT);
        Ok(stats)
    }

    fn decide(
        &self,
        id: &str,
        approver: &str,
        apply: impl FnOnce(&mut Approval) -> Result<(), TransitionError>,
    ) -> Result<Approval, DeskError> {
        if approver.trim().is_empty() {
            return Err(DeskError::Invalid("approver must not be empty".into()));
        }

        let mut approval = self
            .store
            .get(id)?
            .ok_or_else(|| DeskError::NotFound(id.to_string()))?;

        if approval.observe_expiry(Utc::now()) {
            self.store.save(&approval)?;
            return Err(DeskError::Expired(approval.id));
        }
        if approval.status == ApprovalStatus::Timeout {
            return Err(DeskError::Expired(approval.id));
        }

        apply(&mut approval)?;
        self.store.save(&approval)?;
        info!(id = %approval.id, status = %approval.status, by = approver, "Approval decided");
        Ok(approval)
    }
}
