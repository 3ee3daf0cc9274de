//! SQLite-backed message storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use rusqlite_migration::{M, Migrations};

use super::traits::MessageStore;
use crate::models::{MessageEntity, MessageOrigin, SyncState};

/// Maximum bound parameters per statement. SQLite's historical limit is 999;
/// id lists are chunked to stay under it.
const MAX_STATEMENT_PARAMS: usize = 999;

const ENTITY_COLUMNS: &str = "key, message_id, raw_payload, unread, deleted, locally_read, \
     locally_deleted, origin, reporting, sent_at, expires_at";

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Message rows. The autoincrement key breaks ties when duplicate
            -- message IDs slip in from concurrent writers.
            CREATE TABLE messages (
                key INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL,
                raw_payload TEXT NOT NULL,
                unread INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0,
                locally_read INTEGER NOT NULL DEFAULT 0,
                locally_deleted INTEGER NOT NULL DEFAULT 0,
                origin TEXT NOT NULL DEFAULT 'server',
                reporting TEXT,
                sent_at TEXT NOT NULL,
                expires_at TEXT
            );

            CREATE INDEX idx_messages_message_id ON messages(message_id);
            CREATE INDEX idx_messages_sent_at ON messages(sent_at DESC);

            -- Sync cursor per user
            CREATE TABLE sync_state (
                user_id TEXT PRIMARY KEY,
                last_modified TEXT,
                last_synced_at TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// SQLite-backed message store.
///
/// The connection is shared behind a mutex; all bulk mutations run inside a
/// single transaction.
pub struct SqliteMessageStore {
    conn: Mutex<Connection>,
}

impl SqliteMessageStore {
    /// Open (or create) a message store at the given path.
    ///
    /// Fails if the schema cannot be created; this is the one fatal store
    /// error.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL allows concurrent readers during writes; NORMAL sync is safe
        // in WAL mode. Temp state stays in memory.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the store at its default data path
    pub fn open_default() -> Result<Self> {
        let path = config::data_path("messages.sqlite")?;
        Self::new(path)
    }

    fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<MessageEntity> {
        let raw_json: String = row.get(2)?;
        let origin: String = row.get(7)?;
        let reporting_json: Option<String> = row.get(8)?;
        let sent_at_str: String = row.get(9)?;
        let expires_at_str: Option<String> = row.get(10)?;

        let sent_at = DateTime::parse_from_rfc3339(&sent_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let expires_at = expires_at_str.as_deref().and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });

        Ok(MessageEntity {
            row_key: row.get(0)?,
            message_id: row.get(1)?,
            raw: serde_json::from_str(&raw_json).unwrap_or_default(),
            unread: row.get(3)?,
            deleted: row.get(4)?,
            locally_read: row.get(5)?,
            locally_deleted: row.get(6)?,
            origin: MessageOrigin::from_str(&origin),
            reporting: reporting_json.and_then(|s| serde_json::from_str(&s).ok()),
            sent_at,
            expires_at,
        })
    }

    /// Run `sql` once per chunk of ids, binding the chunk as the trailing
    /// `IN (...)` list. `sql` must end with "IN (" ready for placeholders.
    fn execute_chunked(conn: &Connection, sql_prefix: &str, ids: &[String]) -> Result<usize> {
        let mut affected = 0;
        for chunk in ids.chunks(MAX_STATEMENT_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("{sql_prefix}{placeholders})");
            affected += conn.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        Ok(affected)
    }
}

impl MessageStore for SqliteMessageStore {
    fn get_all(&self) -> Result<Vec<MessageEntity>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM messages ORDER BY sent_at DESC, message_id ASC"
        ))?;

        let entities = stmt
            .query_map([], Self::entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entities)
    }

    fn get_message(&self, message_id: &str) -> Result<Option<MessageEntity>> {
        let conn = self.conn.lock().unwrap();

        let entity = conn
            .query_row(
                &format!(
                    "SELECT {ENTITY_COLUMNS} FROM messages WHERE message_id = ? \
                     ORDER BY key DESC LIMIT 1"
                ),
                [message_id],
                Self::entity_from_row,
            )
            .optional()?;

        Ok(entity)
    }

    fn message_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT DISTINCT message_id FROM messages
             WHERE deleted = 0
               AND (expires_at IS NULL OR datetime(expires_at) > datetime(?))",
        )?;

        let ids = stmt
            .query_map([now.to_rfc3339()], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    fn upsert_all(&self, entities: Vec<MessageEntity>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        {
            // Look up the flags of the newest existing row per id so pending
            // local mutations survive the replace.
            let mut select_flags = tx.prepare(
                "SELECT deleted, locally_read, locally_deleted FROM messages
                 WHERE message_id = ? ORDER BY key DESC LIMIT 1",
            )?;
            let mut delete_existing = tx.prepare("DELETE FROM messages WHERE message_id = ?")?;
            let mut insert = tx.prepare(
                "INSERT INTO messages
                 (message_id, raw_payload, unread, deleted, locally_read,
                  locally_deleted, origin, reporting, sent_at, expires_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;

            for entity in &entities {
                let existing: Option<(bool, bool, bool)> = select_flags
                    .query_row([&entity.message_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })
                    .optional()?;

                let (deleted, locally_read, locally_deleted) = existing.unwrap_or((
                    entity.deleted,
                    entity.locally_read,
                    entity.locally_deleted,
                ));

                delete_existing.execute([&entity.message_id])?;
                insert.execute(params![
                    entity.message_id,
                    entity.raw.to_string(),
                    entity.unread,
                    deleted,
                    locally_read,
                    locally_deleted,
                    entity.origin.as_str(),
                    entity.reporting.as_ref().map(|r| r.to_string()),
                    entity.sent_at.to_rfc3339(),
                    entity.expires_at.map(|dt| dt.to_rfc3339()),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn mark_locally_read(&self, message_ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::execute_chunked(
            &tx,
            "UPDATE messages SET locally_read = 1 WHERE message_id IN (",
            message_ids,
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_unread(&self, message_ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::execute_chunked(
            &tx,
            "UPDATE messages SET unread = 1, locally_read = 0 WHERE message_id IN (",
            message_ids,
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_locally_deleted(&self, message_ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::execute_chunked(
            &tx,
            "UPDATE messages SET deleted = 1, locally_deleted = 1 WHERE message_id IN (",
            message_ids,
        )?;
        tx.commit()?;
        Ok(())
    }

    fn confirm_read(&self, message_ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::execute_chunked(
            &tx,
            "UPDATE messages SET unread = 0, locally_read = 0 WHERE message_id IN (",
            message_ids,
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_rows(&self, message_ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::execute_chunked(&tx, "DELETE FROM messages WHERE message_id IN (", message_ids)?;
        tx.commit()?;
        Ok(())
    }

    fn locally_read_messages(&self) -> Result<Vec<MessageEntity>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM messages WHERE locally_read = 1"
        ))?;

        let entities = stmt
            .query_map([], Self::entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entities)
    }

    fn locally_deleted_messages(&self) -> Result<Vec<MessageEntity>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM messages WHERE locally_deleted = 1"
        ))?;

        let entities = stmt
            .query_map([], Self::entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entities)
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();

        let removed = conn.execute(
            "DELETE FROM messages
             WHERE expires_at IS NOT NULL AND datetime(expires_at) <= datetime(?)",
            [now.to_rfc3339()],
        )?;

        Ok(removed)
    }

    fn delete_duplicates(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // Most recently inserted row per message_id wins
        conn.execute(
            "DELETE FROM messages WHERE key NOT IN
             (SELECT MAX(key) FROM messages GROUP BY message_id)",
            [],
        )?;

        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM messages", [])?;
        Ok(())
    }

    fn get_sync_state(&self, user_id: &str) -> Result<Option<SyncState>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT user_id, last_modified, last_synced_at FROM sync_state WHERE user_id = ?",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((user_id, last_modified, last_synced_at_str)) = row else {
            return Ok(None);
        };

        let last_synced_at = DateTime::parse_from_rfc3339(&last_synced_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(SyncState {
            user_id,
            last_modified,
            last_synced_at,
        }))
    }

    fn save_sync_state(&self, state: SyncState) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT OR REPLACE INTO sync_state (user_id, last_modified, last_synced_at)
             VALUES (?, ?, ?)",
            params![
                state.user_id,
                state.last_modified,
                state.last_synced_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn clear_sync_state(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sync_state", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteMessageStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.test.sqlite");
        let store = SqliteMessageStore::new(&db_path).unwrap();
        (store, dir)
    }

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
        let (store, _dir) = create_test_store();

        store.upsert_all(vec![make_entity("m1"), make_entity("m2")]).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 2);

        let m1 = store.get_message("m1").unwrap().unwrap();
        assert_eq!(m1.message_id, "m1");
        assert!(m1.unread);
        assert!(m1.reporting.is_some());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (store, _dir) = create_test_store();

        store.upsert_all(vec![make_entity("m1")]).unwrap();
        store.upsert_all(vec![make_entity("m1")]).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].locally_read);
        assert!(!all[0].locally_deleted);
    }

    #[test]
    fn test_upsert_preserves_dirty_flags() {
        let (store, _dir) = create_test_store();

        store.upsert_all(vec![make_entity("m1")]).unwrap();
        store.mark_locally_read(&["m1".to_string()]).unwrap();

        // A stale server view re-delivers the message as unread
        store.upsert_all(vec![make_entity("m1")]).unwrap();

        let m1 = store.get_message("m1").unwrap().unwrap();
        assert!(m1.locally_read, "pending read flag must survive a re-fetch");
        assert!(m1.unread, "server state is replaced wholesale");

        // Once acknowledged, the next upsert starts clean
        store.confirm_read(&["m1".to_string()]).unwrap();
        let m1 = store.get_message("m1").unwrap().unwrap();
        assert!(!m1.locally_read);
        assert!(!m1.unread);
    }

    #[test]
    fn test_mark_and_confirm_read() {
        let (store, _dir) = create_test_store();

        store
            .upsert_all(vec![make_entity("m1"), make_entity("m2"), make_entity("m3")])
            .unwrap();
        store
            .mark_locally_read(&["m1".to_string(), "m2".to_string()])
            .unwrap();

        let pending = store.locally_read_messages().unwrap();
        assert_eq!(pending.len(), 2);

        store
            .confirm_read(&["m1".to_string(), "m2".to_string()])
            .unwrap();
        assert!(store.locally_read_messages().unwrap().is_empty());

        let m1 = store.get_message("m1").unwrap().unwrap();
        assert!(!m1.unread);
    }

    #[test]
    fn test_mark_unread_clears_pending_read() {
        let (store, _dir) = create_test_store();

        store.upsert_all(vec![make_entity("m1")]).unwrap();
        store.mark_locally_read(&["m1".to_string()]).unwrap();
        store.mark_unread(&["m1".to_string()]).unwrap();

        let m1 = store.get_message("m1").unwrap().unwrap();
        assert!(m1.unread);
        assert!(!m1.locally_read);
        assert!(store.locally_read_messages().unwrap().is_empty());
    }

    #[test]
    fn test_mark_deleted_and_delete_rows() {
        let (store, _dir) = create_test_store();

        store.upsert_all(vec![make_entity("m1"), make_entity("m2")]).unwrap();
        store.mark_locally_deleted(&["m1".to_string()]).unwrap();

        let pending = store.locally_deleted_messages().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message_id, "m1");

        // Deleted rows are no longer visible
        let visible = store.message_ids(Utc::now()).unwrap();
        assert_eq!(visible, vec!["m2".to_string()]);

        store.delete_rows(&["m1".to_string()]).unwrap();
        assert!(store.locally_deleted_messages().unwrap().is_empty());
        assert!(store.get_message("m1").unwrap().is_none());
    }

    #[test]
    fn test_large_batch_roundtrip() {
        let (store, _dir) = create_test_store();

        let entities: Vec<MessageEntity> =
            (0..2000).map(|i| make_entity(&format!("m{i}"))).collect();
        let ids: Vec<String> = entities.iter().map(|e| e.message_id.clone()).collect();

        store.upsert_all(entities).unwrap();
        assert_eq!(store.get_all().unwrap().len(), 2000);

        store.delete_rows(&ids).unwrap();
        assert_eq!(store.get_all().unwrap().len(), 0);
    }

    #[test]
    fn test_delete_duplicates_keeps_newest() {
        let (store, _dir) = create_test_store();

        // Insert the same id twice, bypassing upsert's replace semantics
        {
            let conn = store.conn.lock().unwrap();
            for unread in [1, 0] {
                conn.execute(
                    "INSERT INTO messages (message_id, raw_payload, unread, sent_at)
                     VALUES ('m1', '{}', ?, '2024-10-21T18:41:03+00:00')",
                    [unread],
                )
                .unwrap();
            }
        }

        store.delete_duplicates().unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        // The second insert (unread = 0) has the greater key and wins
        assert!(!all[0].unread);
    }

    #[test]
    fn test_delete_expired() {
        let (store, _dir) = create_test_store();

        let mut expired = make_entity("m1");
        expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        let fresh = make_entity("m2");

        store.upsert_all(vec![expired, fresh]).unwrap();

        let removed = store.delete_expired(Utc::now()).unwrap();
        assert_eq!(removed, 1);

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message_id, "m2");
    }

    #[test]
    fn test_ordering() {
        let (store, _dir) = create_test_store();

        let mut older = make_entity("b-older");
        older.sent_at = Utc::now() - chrono::Duration::hours(2);
        let mut newer = make_entity("a-newer");
        newer.sent_at = Utc::now();

        store.upsert_all(vec![older, newer]).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all[0].message_id, "a-newer");
        assert_eq!(all[1].message_id, "b-older");
    }

    #[test]
    fn test_sync_state_crud() {
        let (store, _dir) = create_test_store();

        assert!(store.get_sync_state("user-1").unwrap().is_none());

        store
            .save_sync_state(SyncState::new("user-1", Some("cursor-a".to_string())))
            .unwrap();

        let state = store.get_sync_state("user-1").unwrap().unwrap();
        assert_eq!(state.last_modified.as_deref(), Some("cursor-a"));

        store
            .save_sync_state(SyncState::new("user-1", Some("cursor-b".to_string())))
            .unwrap();
        let state = store.get_sync_state("user-1").unwrap().unwrap();
        assert_eq!(state.last_modified.as_deref(), Some("cursor-b"));

        store.clear_sync_state().unwrap();
        assert!(store.get_sync_state("user-1").unwrap().is_none());
    }

    #[test]
    fn test_delete_all() {
        let (store, _dir) = create_test_store();

        store.upsert_all(vec![make_entity("m1"), make_entity("m2")]).unwrap();
        store.delete_all().unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }
}
