//! Database view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business
//! logic belongs in higher layers.

use chrono::{DateTime, Utc};

/// One row of the notification audit trail.
#[derive(Debug, Clone)]
pub struct NotificationEntry {
    pub id: i64,
    pub job_id: String,
    pub channel: String,
    pub outcome: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sync-ledger slice of a job row, used by the idempotency check.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub synced: bool,
    pub project_item_id: Option<String>,
}

impl SyncState {
    /// A flag without an item id is not considered synced; it would mean a
    /// partially recorded write.
    pub fn is_synced(&self) -> bool {
        self.synced
            && self
                .project_item_id
                .as_deref()
                .is_some_and(|id| !id.trim().is_empty())
    }
}
