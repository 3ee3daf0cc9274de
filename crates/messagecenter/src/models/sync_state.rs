//! Sync cursor tracking for incremental message fetches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracks the last successfully synced point for a user.
///
/// The `last_modified` cursor is an opaque token returned by the message list
/// endpoint and echoed back on the next conditional fetch. Persisted keyed by
/// user ID so recreating the identity naturally invalidates the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// User the cursor belongs to
    pub user_id: String,
    /// Opaque conditional-fetch token from the last successful fetch
    pub last_modified: Option<String>,
    /// When we last successfully synced
    pub last_synced_at: DateTime<Utc>,
}

impl SyncState {
    /// Create a state after a successful fetch
    pub fn new(user_id: impl Into<String>, last_modified: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            last_modified,
            last_synced_at: Utc::now(),
        }
    }

    /// Update with a new cursor after a successful fetch
    pub fn updated(mut self, last_modified: Option<String>) -> Self {
        self.last_modified = last_modified;
        self.last_synced_at = Utc::now();
        self
    }
}
