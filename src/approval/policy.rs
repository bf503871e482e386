//! Which approval types need a human, per HITL mode.

use crate::approval::types::ApprovalType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much human sign-off a deployment wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitlMode {
    /// Never ask.
    FullAuto,
    /// Ask for test plans only.
    #[default]
    ApprovePlan,
    /// Ask for individual test cases only.
    ApproveTests,
    /// Ask for plans, cases and executions.
    ApproveAll,
    /// Ask for everything.
    Interactive,
}

impl HitlMode {
    pub const ALL: [HitlMode; 5] = [
        HitlMode::FullAuto,
        HitlMode::ApprovePlan,
        HitlMode::ApproveTests,
        HitlMode::ApproveAll,
        HitlMode::Interactive,
    ];

    /// Whether an approval of `approval_type` must go to a reviewer.
    pub fn requires(&self, approval_type: ApprovalType) -> bool {
        match self {
            HitlMode::FullAuto => false,
            HitlMode::ApprovePlan => approval_type == ApprovalType::TestPlan,
            HitlMode::ApproveTests => approval_type == ApprovalType::TestCase,
            HitlMode::ApproveAll => matches!(
                approval_type,
                ApprovalType::TestPlan | ApprovalType::TestCase | ApprovalType::TestExecution
            ),
            HitlMode::Interactive => true,
        }
    }

    pub fn from_str_loose(s: &str) -> Option<HitlMode> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "full_auto" | "auto" | "none" | "off" => Some(HitlMode::FullAuto),
            "approve_plan" | "plan" => Some(HitlMode::ApprovePlan),
            "approve_tests" | "tests" | "approve_test_cases" => Some(HitlMode::ApproveTests),
            "approve_all" | "all" => Some(HitlMode::ApproveAll),
            "interactive" => Some(HitlMode::Interactive),
            _ => None,
        }
    }
}

impl FromStr for HitlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HitlMode::from_str_loose(s).ok_or_else(|| {
            format!(
                "unknown HITL mode '{}' (expected FULL_AUTO, APPROVE_PLAN, APPROVE_TESTS, APPROVE_ALL or INTERACTIVE)",
                s
            )
        })
    }
}

impl fmt::Display for HitlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitlMode::FullAuto => write!(f, "FULL_AUTO"),
            HitlMode::ApprovePlan => write!(f, "APPROVE_PLAN"),
            HitlMode::ApproveTests => write!(f, "APPROVE_TESTS"),
            HitlMode::ApproveAll => write!(f, "APPROVE_ALL"),
            HitlMode::Interactive => write!(f, "INTERACTIVE"),
        }
    }
}
