//! Persistence for approval records.

use crate::approval::types::{Approval, ApprovalStatus};
use crate::store::{JsonDir, StoreError};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{debug, info};

const CHANGE_CAPACITY: usize = 64;

/// Directory-backed approval records, one JSON file per approval ID.
///
/// Saves overwrite: two actors deciding the same record concurrently race,
/// and the last write wins. In-process writers broadcast the saved ID so
/// waiters can re-read early; writes from other processes are only seen by
/// polling.
#[derive(Debug, Clone)]
pub struct ApprovalStore {
    dir: JsonDir,
    changes: broadcast::Sender<String>,
}

impl ApprovalStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = JsonDir::open(root)?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self { dir, changes })
    }

    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    /// Persist the full record, replacing any previous version.
    pub fn save(&self, approval: &Approval) -> Result<(), StoreError> {
        self.dir.write(&approval.id, approval)?;
        debug!(id = %approval.id, status = %approval.status, "Saved approval");
        // No subscribers is fine
        let _ = self.changes.send(approval.id.clone());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Approval>, StoreError> {
        self.dir.read(id)
    }

    /// Read a record and stamp TIMEOUT if it has expired, persisting the
    /// stamp. Any number of readers may race on this; they all write the
    /// same terminal state.
    pub fn get_observed(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Approval>, StoreError> {
        let Some(mut approval) = self.get(id)? else {
            return Ok(None);
        };
        if approval.observe_expiry(now) {
            info!(id = %approval.id, "Approval expired; marking as timed out");
            self.save(&approval)?;
        }
        Ok(Some(approval))
    }

    /// Every record, newest request first.
    pub fn list(&self) -> Result<Vec<Approval>, StoreError> {
        let mut all: Vec<Approval> = self.dir.read_all()?;
        all.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(all)
    }

    /// PENDING records that have not yet expired at `now`, newest first.
    pub fn list_pending(&self, now: DateTime<Utc>) -> Result<Vec<Approval>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| a.effective_status(now) == ApprovalStatus::Pending)
            .collect())
    }

    /// Stamp and persist TIMEOUT on every expired PENDING record.
    /// Returns the records that were stamped by this call.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<Approval>, StoreError> {
        let mut stamped = Vec::new();
        for mut approval in self.list()? {
            if approval.observe_expiry(now) {
                self.save(&approval)?;
                stamped.push(approval);
            }
        }
        if !stamped.is_empty() {
            info!(count = stamped.len(), "Swept expired approvals");
        }
        Ok(stamped)
    }

    /// Receive the ID of every record saved through this store (or a clone).
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
