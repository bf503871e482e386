//! Identifier helpers.
//!
//! Records are addressed by short prefixed IDs (`APPROVAL-1A2B3C4D`) that are
//! safe to use as file names. Pipeline runs use full UUIDs.

use uuid::Uuid;

/// Generate a prefixed identifier: `{prefix}-{8 upper-case hex chars}`.
pub fn prefixed_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    let short = simple[..8].to_uppercase();
    if prefix.is_empty() {
        short
    } else {
        format!("{}-{}", prefix, short)
    }
}

pub fn approval_id() -> String {
    prefixed_id("APPROVAL")
}

pub fn feedback_id() -> String {
    prefixed_id("FB")
}

pub fn test_id() -> String {
    prefixed_id("TEST")
}

pub fn result_id() -> String {
    prefixed_id("RESULT")
}

pub fn run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns true if `id` can be used as a record file stem.
/// Rejects empty IDs, path separators, and anything starting with a dot.
pub fn is_valid_record_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
