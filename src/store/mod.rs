//! Durable JSON document stores.
//!
//! Every record lives in its own `<id>.json` file inside a directory. Writes
//! go to a temporary file first and are renamed into place, so a concurrent
//! reader sees either the previous record or the new one, never a partial
//! write.

pub mod approvals;
pub mod json_dir;

use std::path::PathBuf;
use thiserror::Error;

pub use approvals::ApprovalStore;
pub use json_dir::JsonDir;

/// Errors from the document stores.
///
/// Store failures are never folded into empty results: a caller asking for
/// pending approvals gets an error, not an empty list, when the directory is
/// unreadable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record '{id}': {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record id '{0}'")]
    InvalidId(String),

    #[error("record '{0}' already exists")]
    AlreadyExists(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for a record that exists but could not be parsed.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. })
    }
}
