//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{MessageEntity, SyncState};

/// Trait for message storage operations.
///
/// All mutating operations are transactional: a bulk operation either applies
/// in full or not at all. Implementations must internally batch id lists so
/// no single statement exceeds the underlying engine's parameter limits.
pub trait MessageStore: Send + Sync {
    /// All rows, ordered by sent time descending then message ID
    fn get_all(&self) -> Result<Vec<MessageEntity>>;

    /// Get a single row by message ID
    fn get_message(&self, message_id: &str) -> Result<Option<MessageEntity>>;

    /// IDs of rows currently visible (not deleted, not expired at `now`)
    fn message_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Bulk replace-or-insert.
    ///
    /// A re-inserted row replaces the stored row wholesale, except the
    /// `deleted`, `locally_read` and `locally_deleted` flags of the existing
    /// row are carried over so pending local mutations survive a fetch.
    fn upsert_all(&self, entities: Vec<MessageEntity>) -> Result<()>;

    /// Set the locally-read dirty flag; idempotent
    fn mark_locally_read(&self, message_ids: &[String]) -> Result<()>;

    /// Return rows to the unread state, clearing any pending read flag
    fn mark_unread(&self, message_ids: &[String]) -> Result<()>;

    /// Soft-delete rows and set the locally-deleted dirty flag; idempotent
    fn mark_locally_deleted(&self, message_ids: &[String]) -> Result<()>;

    /// Clear dirty read flags after server acknowledgement
    fn confirm_read(&self, message_ids: &[String]) -> Result<()>;

    /// Remove rows permanently (server acknowledged deletion, or the server
    /// no longer lists them)
    fn delete_rows(&self, message_ids: &[String]) -> Result<()>;

    /// Rows with a pending read mutation
    fn locally_read_messages(&self) -> Result<Vec<MessageEntity>>;

    /// Rows with a pending delete mutation
    fn locally_deleted_messages(&self) -> Result<Vec<MessageEntity>>;

    /// Remove rows expired at `now`; returns the number removed
    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Keep exactly one row per message ID, preferring the most recently
    /// inserted
    fn delete_duplicates(&self) -> Result<()>;

    /// Remove every message row
    fn delete_all(&self) -> Result<()>;

    /// Get the sync cursor for a user
    fn get_sync_state(&self, user_id: &str) -> Result<Option<SyncState>>;

    /// Save the sync cursor (upsert)
    fn save_sync_state(&self, state: SyncState) -> Result<()>;

    /// Drop all sync cursors (identity changed or data purged)
    fn clear_sync_state(&self) -> Result<()>;
}
