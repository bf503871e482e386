//! Built-in settings templates written by `regent init`.
//!
//! - `review-plan`: a human signs off on every test plan, nothing else
//! - `review-all`: plans, cases and executions all need a human
//! - `full-auto`: no human checkpoints, for unattended CI
//! - `interactive`: every artifact is reviewed at the terminal

/// Default template: humans approve test plans through the approval desk.
pub const REVIEW_PLAN_YAML: &str = r#"# regent settings: review-plan
# A human approves every generated test plan. Test cases and executions
# run without interruption.

hitl_mode: APPROVE_PLAN

# How long a request waits for a decision before it times out.
approval_timeout_secs: 3600

# Decisions arrive through the approval store (`regent approvals`, the desk).
reviewer: polling
poll_interval_ms: 1000

# The planning run records the approval request and finishes; check the
# decision later with `regent approvals show <id>`.
plan_approval: detached

max_workers: 4
parallel_execution: true
"#;

pub const REVIEW_ALL_YAML: &str = r#"# regent settings: review-all
# Plans, individual test cases and execution batches all need a human.

hitl_mode: APPROVE_ALL
approval_timeout_secs: 7200
reviewer: polling
poll_interval_ms: 1000

# Planning runs wait for the plan decision and fail when it is rejected.
plan_approval: blocking

max_workers: 4
parallel_execution: true
strict_input: true
"#;

pub const FULL_AUTO_YAML: &str = r#"# regent settings: full-auto
# No human checkpoints. Every approval is recorded as auto-approved by
# `system` so the audit trail stays complete.

hitl_mode: FULL_AUTO
approval_timeout_secs: 3600
reviewer: auto-approve
plan_approval: detached

max_workers: 8
parallel_execution: true
strict_input: true
"#;

pub const INTERACTIVE_YAML: &str = r#"# regent settings: interactive
# Every artifact is shown at the terminal and waits for your answer.

hitl_mode: INTERACTIVE
approval_timeout_secs: 900
reviewer: console
plan_approval: blocking

# One test at a time keeps the prompts readable.
max_workers: 1
parallel_execution: false
"#;

/// YAML content for a named template.
pub fn get_template(name: &str) -> Option<&'static str> {
    match name.to_lowercase().replace('_', "-").as_str() {
        "review-plan" | "plan" | "default" => Some(REVIEW_PLAN_YAML),
        "review-all" | "all" | "strict" => Some(REVIEW_ALL_YAML),
        "full-auto" | "auto" | "ci" => Some(FULL_AUTO_YAML),
        "interactive" | "console" => Some(INTERACTIVE_YAML),
        _ => None,
    }
}

/// All template names with a one-line description.
pub fn available_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        ("review-plan", "Humans approve test plans; everything else runs unattended"),
        ("review-all", "Plans, cases and executions all need a human"),
        ("full-auto", "No human checkpoints; for CI"),
        ("interactive", "Every artifact is reviewed at the terminal"),
    ]
}
