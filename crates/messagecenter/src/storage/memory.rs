//! In-memory storage implementation
//!
//! Used for testing and as a stub before a durable store is wired in.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use super::traits::MessageStore;
use crate::models::{MessageEntity, SyncState};

/// In-memory implementation of [`MessageStore`].
///
/// Rows live in a plain `Vec` so duplicate message IDs can exist, matching
/// the durable store's key semantics.
pub struct InMemoryMessageStore {
    rows: RwLock<Vec<MessageEntity>>,
    sync_states: RwLock<HashMap<String, SyncState>>,
    next_key: AtomicI64,
}

impl InMemoryMessageStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            sync_states: RwLock::new(HashMap::new()),
            next_key: AtomicI64::new(1),
        }
    }

    fn allocate_key(&self) -> i64 {
        self.next_key.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn get_all(&self) -> Result<Vec<MessageEntity>> {
        let rows = self.rows.read().unwrap();
        let mut all: Vec<MessageEntity> = rows.clone();
        all.sort_by(|a, b| {
            b.sent_at
                .cmp(&a.sent_at)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        Ok(all)
    }

    fn get_message(&self, message_id: &str) -> Result<Option<MessageEntity>> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.message_id == message_id)
            .max_by_key(|r| r.row_key)
            .cloned())
    }

    fn message_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = self.rows.read().unwrap();
        let mut seen = std::collections::HashSet::new();
        let ids: Vec<String> = rows
            .iter()
            .filter(|r| !r.deleted && !r.is_expired_at(now))
            .map(|r| r.message_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Ok(ids)
    }

    fn upsert_all(&self, entities: Vec<MessageEntity>) -> Result<()> {
        let mut rows = self.rows.write().unwrap();

        for mut entity in entities {
            let existing = rows
                .iter()
                .filter(|r| r.message_id == entity.message_id)
                .max_by_key(|r| r.row_key)
                .map(|r| (r.deleted, r.locally_read, r.locally_deleted));

            if let Some((deleted, locally_read, locally_deleted)) = existing {
                entity.deleted = deleted;
                entity.locally_read = locally_read;
                entity.locally_deleted = locally_deleted;
            }

            rows.retain(|r| r.message_id != entity.message_id);
            entity.row_key = self.allocate_key();
            rows.push(entity);
        }

        Ok(())
    }

    fn mark_locally_read(&self, message_ids: &[String]) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        for row in rows.iter_mut() {
            if message_ids.contains(&row.message_id) {
                row.locally_read = true;
            }
        }
        Ok(())
    }

    fn mark_unread(&self, message_ids: &[String]) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        for row in rows.iter_mut() {
            if message_ids.contains(&row.message_id) {
                row.unread = true;
                row.locally_read = false;
            }
        }
        Ok(())
    }

    fn mark_locally_deleted(&self, message_ids: &[String]) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        for row in rows.iter_mut() {
            if message_ids.contains(&row.message_id) {
                row.deleted = true;
                row.locally_deleted = true;
            }
        }
        Ok(())
    }

    fn confirm_read(&self, message_ids: &[String]) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        for row in rows.iter_mut() {
            if message_ids.contains(&row.message_id) {
                row.unread = false;
                row.locally_read = false;
            }
        }
        Ok(())
    }

    fn delete_rows(&self, message_ids: &[String]) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        rows.retain(|r| !message_ids.contains(&r.message_id));
        Ok(())
    }

    fn locally_read_messages(&self) -> Result<Vec<MessageEntity>> {
        let rows = self.rows.read().unwrap();
        Ok(rows.iter().filter(|r| r.locally_read).cloned().collect())
    }

    fn locally_deleted_messages(&self) -> Result<Vec<MessageEntity>> {
        let rows = self.rows.read().unwrap();
        Ok(rows.iter().filter(|r| r.locally_deleted).cloned().collect())
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| !r.is_expired_at(now));
        Ok(before - rows.len())
    }

    fn delete_duplicates(&self) -> Result<()> {
        let mut rows = self.rows.write().unwrap();

        let mut newest: HashMap<String, i64> = HashMap::new();
        for row in rows.iter() {
            let entry = newest.entry(row.message_id.clone()).or_insert(row.row_key);
            if row.row_key > *entry {
                *entry = row.row_key;
            }
        }

        rows.retain(|r| newest.get(&r.message_id) == Some(&r.row_key));
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.rows.write().unwrap().clear();
        Ok(())
    }

    fn get_sync_state(&self, user_id: &str) -> Result<Option<SyncState>> {
        let states = self.sync_states.read().unwrap();
        Ok(states.get(user_id).cloned())
    }

    fn save_sync_state(&self, state: SyncState) -> Result<()> {
        let mut states = self.sync_states.write().unwrap();
        states.insert(state.user_id.clone(), state);
        Ok(())
    }

    fn clear_sync_state(&self) -> Result<()> {
        self.sync_states.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_entity(id: &str) -> MessageEntity {
        MessageEntity::from_payload(&json!({
            "message_id": id,
            "title": format!("Title {id}"),
            "message_body_url": format!("https://example.com/messages/{id}/body"),
            "message_sent": "2024-10-21T18:41:03+00:00",
            "unread": true,
            "message_reporting": { "message_id": id }
        }))
        .unwrap()
    }

    #[test]
    fn test_upsert_and_get() {
        let store = InMemoryMessageStore::new();

        store.upsert_all(vec![make_entity("m1")]).unwrap();
        store.upsert_all(vec![make_entity("m1")]).unwrap();

        assert_eq!(store.get_all().unwrap().len(), 1);
        assert!(store.get_message("m1").unwrap().is_some());
        assert!(store.get_message("m2").unwrap().is_none());
    }

    #[test]
    fn test_upsert_preserves_dirty_flags() {
        let store = InMemoryMessageStore::new();

        store.upsert_all(vec![make_entity("m1")]).unwrap();
        store.mark_locally_read(&["m1".to_string()]).unwrap();
        store.upsert_all(vec![make_entity("m1")]).unwrap();

        let m1 = store.get_message("m1").unwrap().unwrap();
        assert!(m1.locally_read);
    }

    #[test]
    fn test_mark_deleted_hides_row() {
        let store = InMemoryMessageStore::new();

        store.upsert_all(vec![make_entity("m1"), make_entity("m2")]).unwrap();
        store.mark_locally_deleted(&["m1".to_string()]).unwrap();

        assert_eq!(store.message_ids(Utc::now()).unwrap(), vec!["m2".to_string()]);
        assert_eq!(store.locally_deleted_messages().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_duplicates() {
        let store = InMemoryMessageStore::new();

        // Force duplicate rows past upsert's replace semantics
        {
            let mut rows = store.rows.write().unwrap();
            let mut first = make_entity("m1");
            first.row_key = 1;
            let mut second = make_entity("m1");
            second.row_key = 2;
            second.unread = false;
            rows.push(first);
            rows.push(second);
        }

        store.delete_duplicates().unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].row_key, 2);
    }

    #[test]
    fn test_delete_expired() {
        let store = InMemoryMessageStore::new();

        let mut expired = make_entity("m1");
        expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.upsert_all(vec![expired, make_entity("m2")]).unwrap();

        assert_eq!(store.delete_expired(Utc::now()).unwrap(), 1);
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_sync_state_crud() {
        let store = InMemoryMessageStore::new();

        assert!(store.get_sync_state("user-1").unwrap().is_none());
        store
            .save_sync_state(SyncState::new("user-1", Some("cursor-a".to_string())))
            .unwrap();
        assert!(store.get_sync_state("user-1").unwrap().is_some());
        store.clear_sync_state().unwrap();
        assert!(store.get_sync_state("user-1").unwrap().is_none());
    }
}
