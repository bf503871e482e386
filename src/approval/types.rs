//! Approval records and the decisions that resolve them.
//!
//! An [`Approval`] starts out PENDING and moves exactly once into one of the
//! terminal states. The transition methods are the only code that writes the
//! response fields, and they refuse to run on a resolved record.

use crate::error::TransitionError;
use crate::utils::ids::approval_id;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default review window: one hour.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Free-form audit metadata attached to an approval (agent, application, ...).
pub type Context = BTreeMap<String, Value>;

/// The kind of artifact under review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    #[serde(alias = "TEST_PLAN")]
    TestPlan,
    #[serde(alias = "TEST_CASE")]
    TestCase,
    #[serde(alias = "TEST_EXECUTION")]
    TestExecution,
    #[serde(alias = "DISCOVERY_RESULTS")]
    DiscoveryResults,
    #[serde(alias = "GENERATED_CODE")]
    GeneratedCode,
}

impl ApprovalType {
    pub const ALL: [ApprovalType; 5] = [
        ApprovalType::TestPlan,
        ApprovalType::TestCase,
        ApprovalType::TestExecution,
        ApprovalType::DiscoveryResults,
        ApprovalType::GeneratedCode,
    ];

    pub fn from_str_loose(s: &str) -> Option<ApprovalType> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "test_plan" | "plan" => Some(ApprovalType::TestPlan),
            "test_case" | "case" | "test" => Some(ApprovalType::TestCase),
            "test_execution" | "execution" | "run" => Some(ApprovalType::TestExecution),
            "discovery_results" | "discovery" => Some(ApprovalType::DiscoveryResults),
            "generated_code" | "code" => Some(ApprovalType::GeneratedCode),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalType::TestPlan => write!(f, "test_plan"),
            ApprovalType::TestCase => write!(f, "test_case"),
            ApprovalType::TestExecution => write!(f, "test_execution"),
            ApprovalType::DiscoveryResults => write!(f, "discovery_results"),
            ApprovalType::GeneratedCode => write!(f, "generated_code"),
        }
    }
}

/// Lifecycle state of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[serde(alias = "PENDING")]
    Pending,
    #[serde(alias = "APPROVED")]
    Approved,
    #[serde(alias = "REJECTED")]
    Rejected,
    #[serde(alias = "MODIFIED")]
    Modified,
    #[serde(alias = "TIMEOUT")]
    Timeout,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 5] = [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
        ApprovalStatus::Modified,
        ApprovalStatus::Timeout,
    ];

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// APPROVED or MODIFIED: the item may be used.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Modified)
    }

    pub fn from_str_loose(s: &str) -> Option<ApprovalStatus> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" | "approve" => Some(ApprovalStatus::Approved),
            "rejected" | "reject" | "denied" => Some(ApprovalStatus::Rejected),
            "modified" | "modify" => Some(ApprovalStatus::Modified),
            "timeout" | "timed_out" | "expired" => Some(ApprovalStatus::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
            ApprovalStatus::Modified => write!(f, "modified"),
            ApprovalStatus::Timeout => write!(f, "timeout"),
        }
    }
}

fn default_status() -> ApprovalStatus {
    ApprovalStatus::Pending
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// A persisted request for one human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,
    pub approval_type: ApprovalType,
    pub item_id: String,
    /// The payload under review.
    pub item_data: Value,
    pub item_summary: String,

    #[serde(default = "default_status")]
    pub status: ApprovalStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Set on REJECTED only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// The patch a reviewer applied. Set on MODIFIED only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifications: Option<Value>,
    /// The item after the patch. Set on MODIFIED only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_item: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    pub requested_at: DateTime<Utc>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Cached `requested_at + timeout_seconds`. Records written by other
    /// tools may omit it; [`Approval::expires_at`] derives it then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub context: Context,
}

impl Approval {
    /// A new PENDING approval requested now, with the default timeout.
    pub fn new(
        approval_type: ApprovalType,
        item_id: impl Into<String>,
        item_data: Value,
        item_summary: impl Into<String>,
    ) -> Self {
        let requested_at = Utc::now();
        Self {
            id: approval_id(),
            approval_type,
            item_id: item_id.into(),
            item_data,
            item_summary: item_summary.into(),
            status: ApprovalStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            modifications: None,
            modified_item: None,
            comments: None,
            requested_at,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            expires_at: Some(deadline(requested_at, DEFAULT_TIMEOUT_SECS)),
            context: Context::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self.expires_at = Some(deadline(self.requested_at, timeout_seconds));
        self
    }

    /// Backdate or postdate the request (restoring records, tests).
    pub fn with_requested_at(mut self, requested_at: DateTime<Utc>) -> Self {
        self.requested_at = requested_at;
        self.expires_at = Some(deadline(requested_at, self.timeout_seconds));
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
            .unwrap_or_else(|| deadline(self.requested_at, self.timeout_seconds))
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// True once `now` is past the deadline. Meaningful for PENDING records.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// The status a reader should act on: a PENDING record past its deadline
    /// reads as TIMEOUT even before anyone has stamped it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ApprovalStatus {
        if self.is_pending() && self.is_expired(now) {
            ApprovalStatus::Timeout
        } else {
            self.status
        }
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at() - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// The artifact a caller should use: `modified_item` when a reviewer
    /// changed it, `item_data` otherwise.
    pub fn resolved_item(&self) -> &Value {
        self.modified_item.as_ref().unwrap_or(&self.item_data)
    }

    pub fn approve(
        &mut self,
        approver: impl Into<String>,
        comments: Option<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        self.status = ApprovalStatus::Approved;
        self.approved_by = Some(approver.into());
        self.approved_at = Some(Utc::now());
        self.comments = comments;
        Ok(())
    }

    pub fn reject(
        &mut self,
        approver: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(TransitionError::EmptyReason);
        }
        self.status = ApprovalStatus::Rejected;
        self.approved_by = Some(approver.into());
        self.approved_at = Some(Utc::now());
        self.rejection_reason = Some(reason);
        Ok(())
    }

    /// Resolve as MODIFIED. Without an explicit `modified_item` the result is
    /// `modifications` merged over `item_data` (top-level keys replaced).
    pub fn modify(
        &mut self,
        approver: impl Into<String>,
        modifications: Value,
        modified_item: Option<Value>,
        comments: Option<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        if is_empty_patch(&modifications) {
            return Err(TransitionError::EmptyModifications);
        }
        let modified_item =
            modified_item.unwrap_or_else(|| merge_patch(&self.item_data, &modifications));

        self.status = ApprovalStatus::Modified;
        self.approved_by = Some(approver.into());
        self.approved_at = Some(Utc::now());
        self.modifications = Some(modifications);
        self.modified_item = Some(modified_item);
        self.comments = comments;
        Ok(())
    }

    /// Resolve as TIMEOUT regardless of the clock. Used by a waiter whose own
    /// deadline fired.
    pub fn mark_timed_out(&mut self) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        self.status = ApprovalStatus::Timeout;
        Ok(())
    }

    /// Stamp TIMEOUT if the record is PENDING and past its deadline.
    /// Returns true if this call changed the record. Safe to call from any
    /// number of observers.
    pub fn observe_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_pending() && self.is_expired(now) {
            self.status = ApprovalStatus::Timeout;
            true
        } else {
            false
        }
    }

    fn ensure_pending(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyResolved {
                id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }
}

fn deadline(requested_at: DateTime<Utc>, timeout_seconds: u64) -> DateTime<Utc> {
    let secs = i64::try_from(timeout_seconds).unwrap_or(i64::MAX);
    ChronoDuration::try_seconds(secs)
        .and_then(|d| requested_at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn is_empty_patch(patch: &Value) -> bool {
    match patch {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Shallow merge: every top-level key of `patch` replaces the one in `item`.
/// A non-object item is replaced by the patch outright.
pub fn merge_patch(item: &Value, patch: &Value) -> Value {
    match (item, patch) {
        (Value::Object(base), Value::Object(changes)) => {
            let mut merged = base.clone();
            for (key, value) in changes {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => patch.clone(),
    }
}

/// What a review channel hands back to the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve {
        approver: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comments: Option<String>,
    },
    Reject {
        approver: String,
        reason: String,
    },
    Modify {
        approver: String,
        modifications: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modified_item: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comments: Option<String>,
    },
    Timeout,
}

impl ReviewDecision {
    /// Map a resolved record back into a decision. `None` while PENDING.
    pub fn from_resolved(approval: &Approval) -> Option<ReviewDecision> {
        let approver = || {
            approval
                .approved_by
                .clone()
                .unwrap_or_else(|| "unknown".to_string())
        };
        match approval.status {
            ApprovalStatus::Pending => None,
            ApprovalStatus::Approved => Some(ReviewDecision::Approve {
                approver: approver(),
                comments: approval.comments.clone(),
            }),
            ApprovalStatus::Rejected => Some(ReviewDecision::Reject {
                approver: approver(),
                reason: approval
                    .rejection_reason
                    .clone()
                    .unwrap_or_else(|| "No reason provided".to_string()),
            }),
            ApprovalStatus::Modified => Some(ReviewDecision::Modify {
                approver: approver(),
                modifications: approval.modifications.clone().unwrap_or(Value::Null),
                modified_item: approval.modified_item.clone(),
                comments: approval.comments.clone(),
            }),
            ApprovalStatus::Timeout => Some(ReviewDecision::Timeout),
        }
    }

    /// Apply this decision to a PENDING record.
    pub fn apply(self, approval: &mut Approval) -> Result<(), TransitionError> {
        match self {
            ReviewDecision::Approve { approver, comments } => approval.approve(approver, comments),
            ReviewDecision::Reject { approver, reason } => approval.reject(approver, reason),
            ReviewDecision::Modify {
                approver,
                modifications,
                modified_item,
                comments,
            } => approval.modify(approver, modifications, modified_item, comments),
            ReviewDecision::Timeout => approval.mark_timed_out(),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ReviewDecision::Approve { .. } => "approve",
            ReviewDecision::Reject { .. } => "reject",
            ReviewDecision::Modify { .. } => "modify",
            ReviewDecision::Timeout => "timeout",
        }
    }
}

/// Input to [`crate::approval::ApprovalManager::request_approval`].
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub approval_type: ApprovalType,
    pub item_id: String,
    pub item_data: Value,
    pub item_summary: String,
    pub context: Context,
    /// Overrides the manager's default timeout.
    pub timeout_seconds: Option<u64>,
}

impl ApprovalRequest {
    pub fn new(
        approval_type: ApprovalType,
        item_id: impl Into<String>,
        item_data: Value,
        item_summary: impl Into<String>,
    ) -> Self {
        Self {
            approval_type,
            item_id: item_id.into(),
            item_data,
            item_summary: item_summary.into(),
            context: Context::new(),
            timeout_seconds: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }
}
