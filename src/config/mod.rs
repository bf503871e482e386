//! Settings: YAML file, environment overrides, templates and linting.

pub mod defaults;
pub mod linter;
pub mod parser;
pub mod types;

pub use parser::{find_settings_file, load_settings, parse_settings_file, parse_settings_str};
pub use types::{ApprovalGate, ReviewerKind, Settings};
