//! Settings types.

use crate::approval::policy::HitlMode;
use crate::approval::types::DEFAULT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const SETTINGS_FILE_NAME: &str = ".regent.yaml";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 10_000;

/// Which review channel the approval manager talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewerKind {
    /// Prompt on the terminal.
    #[default]
    Console,
    /// Wait for a decision written to the approval store.
    Polling,
    /// Approve everything (unattended runs).
    AutoApprove,
    /// Reject everything.
    AutoDeny,
}

impl ReviewerKind {
    pub fn from_str_loose(s: &str) -> Option<ReviewerKind> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "console" | "cli" | "terminal" => Some(ReviewerKind::Console),
            "polling" | "web" | "store" | "desk" => Some(ReviewerKind::Polling),
            "auto-approve" | "approve-all" => Some(ReviewerKind::AutoApprove),
            "auto-deny" | "deny-all" => Some(ReviewerKind::AutoDeny),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewerKind::Console => write!(f, "console"),
            ReviewerKind::Polling => write!(f, "polling"),
            ReviewerKind::AutoApprove => write!(f, "auto-approve"),
            ReviewerKind::AutoDeny => write!(f, "auto-deny"),
        }
    }
}

/// How the planning pipeline's approval stage behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalGate {
    /// Record the request and move on; the decision is checked later.
    #[default]
    Detached,
    /// Wait for the decision; a rejection or timeout fails the run.
    Blocking,
}

impl ApprovalGate {
    pub fn from_str_loose(s: &str) -> Option<ApprovalGate> {
        match s.trim().to_lowercase().as_str() {
            "detached" | "async" | "fire_and_forget" | "fire-and-forget" => {
                Some(ApprovalGate::Detached)
            }
            "blocking" | "sync" | "wait" => Some(ApprovalGate::Blocking),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalGate::Detached => write!(f, "detached"),
            ApprovalGate::Blocking => write!(f, "blocking"),
        }
    }
}

/// Resolved settings for one process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub hitl_mode: HitlMode,
    pub approval_timeout_secs: u64,
    pub reviewer: ReviewerKind,
    pub poll_interval_ms: u64,
    pub plan_approval: ApprovalGate,
    pub max_workers: usize,
    pub parallel_execution: bool,
    /// Root of `approvals/`, `feedback/` and `runs/`.
    pub data_dir: PathBuf,
    /// Fail input validation on prompt-injection patterns instead of
    /// removing them.
    pub strict_input: bool,
    pub max_input_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hitl_mode: HitlMode::default(),
            approval_timeout_secs: DEFAULT_TIMEOUT_SECS,
            reviewer: ReviewerKind::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            plan_approval: ApprovalGate::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            parallel_execution: true,
            data_dir: default_data_dir(),
            strict_input: false,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn approvals_dir(&self) -> PathBuf {
        self.data_dir.join("approvals")
    }

    pub fn feedback_dir(&self) -> PathBuf {
        self.data_dir.join("feedback")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    /// Default socket of `regent desk serve`.
    pub fn desk_socket(&self) -> PathBuf {
        self.data_dir.join("desk.sock")
    }

    /// Worker pool size actually used: at least one, and one when parallel
    /// execution is off.
    pub fn effective_workers(&self) -> usize {
        if self.parallel_execution {
            self.max_workers.max(1)
        } else {
            1
        }
    }
}

/// `~/.regent`, or `.regent` in the working directory when there is no home.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".regent"))
        .unwrap_or_else(|| PathBuf::from(".regent"))
}
