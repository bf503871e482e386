//! Settings linter: flags combinations that are legal but probably not what
//! the user meant. Run by `regent check`.

use crate::approval::policy::HitlMode;
use crate::config::types::*;
use colored::Colorize;

/// Something the user should know about their settings.
#[derive(Debug)]
pub struct LintWarning {
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Likely to misbehave
    Warning,
    /// Worth knowing
    Info,
}

impl LintWarning {
    fn warn_with_fix(msg: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: msg.into(),
            suggestion: Some(fix.into()),
        }
    }

    fn info(msg: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: msg.into(),
            suggestion: None,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Format for terminal output.
    pub fn display(&self) -> String {
        let icon = match self.severity {
            Severity::Warning => "⚠".yellow().to_string(),
            Severity::Info => "ℹ".blue().to_string(),
        };
        let mut out = format!("  {} {}", icon, self.message);
        if let Some(ref suggestion) = self.suggestion {
            out.push_str(&format!("\n    {}: {}", "Fix".green(), suggestion));
        }
        out
    }
}

/// Lint settings and return warnings.
pub fn lint_settings(settings: &Settings) -> Vec<LintWarning> {
    let mut warnings = Vec::new();

    check_poll_interval(settings, &mut warnings);
    check_reviewer_mode(settings, &mut warnings);
    check_plan_gate(settings, &mut warnings);
    check_workers(settings, &mut warnings);
    check_timeout(settings, &mut warnings);

    warnings
}

fn check_poll_interval(settings: &Settings, warnings: &mut Vec<LintWarning>) {
    if settings.reviewer != ReviewerKind::Polling {
        return;
    }
    let timeout_ms = settings.approval_timeout_secs.saturating_mul(1000);
    if settings.poll_interval_ms >= timeout_ms {
        warnings.push(LintWarning::warn_with_fix(
            format!(
                "poll_interval_ms ({}) is not shorter than the approval timeout ({}s); decisions may only be seen at the deadline",
                settings.poll_interval_ms, settings.approval_timeout_secs
            ),
            "Set poll_interval_ms well below approval_timeout_secs * 1000 (1000 is the default)",
        ));
    }
}

fn check_reviewer_mode(settings: &Settings, warnings: &mut Vec<LintWarning>) {
    match (settings.hitl_mode, settings.reviewer) {
        (HitlMode::FullAuto, ReviewerKind::Polling) | (HitlMode::FullAuto, ReviewerKind::Console) => {
            warnings.push(LintWarning::info(format!(
                "hitl_mode is FULL_AUTO, so the {} reviewer is never consulted",
                settings.reviewer
            )));
        }
        (HitlMode::FullAuto, _) => {}
        (mode, ReviewerKind::AutoApprove) => {
            warnings.push(LintWarning::warn_with_fix(
                format!(
                    "hitl_mode {} asks for human review but the auto-approve reviewer accepts everything",
                    mode
                ),
                "Use reviewer: polling or console, or set hitl_mode: FULL_AUTO",
            ));
        }
        (_, ReviewerKind::AutoDeny) => {
            warnings.push(LintWarning::info(
                "The auto-deny reviewer rejects every request that needs a human",
            ));
        }
        _ => {}
    }
}

fn check_plan_gate(settings: &Settings, warnings: &mut Vec<LintWarning>) {
    match (settings.hitl_mode, settings.plan_approval) {
        (HitlMode::Interactive, ApprovalGate::Blocking) => {
            warnings.push(LintWarning::warn_with_fix(
                "INTERACTIVE mode with blocking plan approval holds every planning run until someone answers",
                "Use plan_approval: detached to record the request and decide later",
            ));
        }
        (_, ApprovalGate::Detached) if settings.reviewer == ReviewerKind::Console => {
            warnings.push(LintWarning::info(
                "Detached plan approvals never reach the console reviewer; decide them with `regent approvals`",
            ));
        }
        _ => {}
    }
}

fn check_workers(settings: &Settings, warnings: &mut Vec<LintWarning>) {
    if settings.max_workers == 0 {
        warnings.push(LintWarning::warn_with_fix(
            "max_workers is 0; tests will run on a single worker",
            "Set max_workers to 1 or more",
        ));
    } else if !settings.parallel_execution && settings.max_workers > 1 {
        warnings.push(LintWarning::info(format!(
            "parallel_execution is off, so max_workers ({}) is ignored",
            settings.max_workers
        )));
    }
}

fn check_timeout(settings: &Settings, warnings: &mut Vec<LintWarning>) {
    if settings.approval_timeout_secs > 24 * 3600 {
        warnings.push(LintWarning::info(format!(
            "approval_timeout_secs is {}; pending approvals will linger for more than a day",
            settings.approval_timeout_secs
        )));
    }
}
