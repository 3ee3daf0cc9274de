//! Message model representing an inbox message

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::MessageEntity;

/// A single inbox message, derived from a persisted [`MessageEntity`].
///
/// Messages are immutable snapshots of local state; the unread flag reflects
/// the client view (local mark-read/unread applied on top of the server
/// state).
#[derive(Debug, Clone)]
pub struct Message {
    /// Stable message ID assigned by the remote service
    pub id: String,
    /// Message title
    pub title: String,
    /// URL for the message body
    pub body_url: String,
    /// URL for the message resource itself
    pub message_url: Option<String>,
    /// When the message was sent (UTC)
    pub sent: DateTime<Utc>,
    /// When the message expires, if ever (UTC)
    pub expiration: Option<DateTime<Utc>>,
    /// Additional key-value pairs attached to the message
    pub extras: HashMap<String, String>,
    /// The raw payload as delivered by the remote service
    pub raw: JsonValue,
    /// Reporting document echoed back on read/delete acknowledgement
    pub(crate) reporting: Option<JsonValue>,
    unread: bool,
}

/// Subset of the payload the engine interprets; used for parsing only
#[derive(Debug, Deserialize)]
pub(crate) struct PayloadFields {
    pub message_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message_body_url: Option<String>,
    #[serde(default)]
    pub message_url: Option<String>,
    #[serde(default)]
    pub message_sent: Option<String>,
    #[serde(default)]
    pub message_expiry: Option<String>,
    #[serde(default)]
    pub unread: Option<bool>,
    #[serde(default)]
    pub extra: Option<serde_json::Map<String, JsonValue>>,
    #[serde(default)]
    pub message_reporting: Option<JsonValue>,
}

impl Message {
    /// Build the user-facing view from a persisted entity.
    ///
    /// Returns `None` if the raw payload is missing fields required for
    /// display (id, title, body URL).
    pub(crate) fn from_entity(entity: &MessageEntity) -> Option<Self> {
        let fields: PayloadFields = serde_json::from_value(entity.raw.clone()).ok()?;
        let title = fields.title?;
        let body_url = fields.message_body_url?;

        let extras = fields
            .extra
            .map(|map| {
                map.into_iter()
                    .map(|(k, v)| {
                        let value = match v {
                            JsonValue::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id: entity.message_id.clone(),
            title,
            body_url,
            message_url: fields.message_url,
            sent: entity.sent_at,
            expiration: entity.expires_at,
            extras,
            raw: entity.raw.clone(),
            reporting: entity.reporting.clone(),
            unread: entity.unread && !entity.locally_read,
        })
    }

    /// Whether the message is unread from the client's point of view
    pub fn is_unread(&self) -> bool {
        self.unread
    }

    pub(crate) fn set_unread(&mut self, unread: bool) {
        self.unread = unread;
    }

    /// Whether the message has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the message is expired relative to the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiry| expiry <= now)
    }
}

/// Parse a payload timestamp.
///
/// The service emits RFC 3339; older payloads use a space-separated UTC
/// format, accepted as a fallback.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
