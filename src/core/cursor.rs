use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted sync state: when tabs were last reported, how many, and the
/// newest inbound message id already consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub tab_count: Option<usize>,
    pub last_message_id: Option<String>,
}

impl SyncCursor {
    /// Record a completed tab report.
    pub fn record_tabs(&mut self, at: DateTime<Utc>, tab_count: usize) {
        self.last_sync_at = Some(at);
        self.tab_count = Some(tab_count);
    }

    /// Move the cursor to `id`, the newest message the relay has returned.
    /// The relay owns message ordering, so any id other than the current one
    /// moves the cursor. Returns whether it moved.
    pub fn advance(&mut self, id: &str) -> bool {
        if self.last_message_id.as_deref() == Some(id) {
            return false;
        }
        self.last_message_id = Some(id.to_string());
        true
    }
}
