//! Persisted message row

use chrono::{DateTime, Utc};
use log::error;
use serde_json::Value as JsonValue;

use super::message::{PayloadFields, parse_timestamp};

/// Where a persisted message row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Delivered by a message list fetch
    Server,
    /// Constructed locally (e.g. from a push payload) before the next fetch
    Client,
}

impl MessageOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOrigin::Server => "server",
            MessageOrigin::Client => "client",
        }
    }

    pub fn from_str(raw: &str) -> Self {
        match raw {
            "client" => MessageOrigin::Client,
            _ => MessageOrigin::Server,
        }
    }
}

/// A message row as persisted in the local store.
///
/// `unread` tracks the server-acknowledged state; `locally_read` and
/// `locally_deleted` are dirty flags for mutations the server has not yet
/// confirmed. `deleted` hides the row from listings as soon as the client
/// deletes it, before the server acknowledges and the row is removed.
#[derive(Debug, Clone)]
pub struct MessageEntity {
    /// Store row key; 0 until the row has been persisted
    pub row_key: i64,
    pub message_id: String,
    /// Raw payload as delivered by the remote service
    pub raw: JsonValue,
    pub unread: bool,
    pub deleted: bool,
    pub locally_read: bool,
    pub locally_deleted: bool,
    pub origin: MessageOrigin,
    /// Opaque reporting document, echoed back verbatim when acknowledging
    /// read/delete state
    pub reporting: Option<JsonValue>,
    pub sent_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl MessageEntity {
    /// Build an entity from a remote message payload.
    ///
    /// Returns `None` (and logs) when the payload is not an object or is
    /// missing its message ID; a bad list entry never aborts a merge.
    pub fn from_payload(payload: &JsonValue) -> Option<Self> {
        if !payload.is_object() {
            error!("Invalid message payload: {payload}");
            return None;
        }

        let fields: PayloadFields = match serde_json::from_value(payload.clone()) {
            Ok(fields) => fields,
            Err(e) => {
                error!("Invalid message payload, missing message ID: {e}");
                return None;
            }
        };

        let sent_at = fields
            .message_sent
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let expires_at = fields.message_expiry.as_deref().and_then(parse_timestamp);

        Some(Self {
            row_key: 0,
            message_id: fields.message_id,
            raw: payload.clone(),
            unread: fields.unread.unwrap_or(true),
            deleted: false,
            locally_read: false,
            locally_deleted: false,
            origin: MessageOrigin::Server,
            reporting: fields.message_reporting,
            sent_at,
            expires_at,
        })
    }

    /// Whether the row is expired relative to the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_payload() {
        let payload = json!({
            "message_id": "m1",
            "title": "Hello",
            "message_body_url": "https://example.com/body",
            "message_sent": "2024-10-21T18:41:03+00:00",
            "unread": false,
            "message_reporting": { "message_id": "m1", "group": "g" }
        });

        let entity = MessageEntity::from_payload(&payload).unwrap();
        assert_eq!(entity.message_id, "m1");
        assert!(!entity.unread);
        assert!(!entity.deleted);
        assert!(!entity.locally_read);
        assert_eq!(entity.origin, MessageOrigin::Server);
        // The reporting document round-trips untouched
        assert_eq!(
            entity.reporting,
            Some(json!({ "message_id": "m1", "group": "g" }))
        );
        assert_eq!(entity.raw, payload);
    }

    #[test]
    fn test_unread_defaults_true() {
        let payload = json!({ "message_id": "m1" });
        let entity = MessageEntity::from_payload(&payload).unwrap();
        assert!(entity.unread);
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(MessageEntity::from_payload(&json!("just a string")).is_none());
        assert!(MessageEntity::from_payload(&json!(["list"])).is_none());
    }

    #[test]
    fn test_rejects_missing_id() {
        let payload = json!({ "title": "No id here" });
        assert!(MessageEntity::from_payload(&payload).is_none());
    }

    #[test]
    fn test_expiry() {
        let payload = json!({
            "message_id": "m1",
            "message_expiry": "2020-01-01T00:00:00+00:00"
        });
        let entity = MessageEntity::from_payload(&payload).unwrap();
        assert!(entity.is_expired_at(Utc::now()));

        let payload = json!({ "message_id": "m2" });
        let entity = MessageEntity::from_payload(&payload).unwrap();
        assert!(!entity.is_expired_at(Utc::now()));
    }
}
