//! Remote inbox API integration
//!
//! This module provides:
//! - The [`InboxApi`] seam the sync engine calls through
//! - A stateless ureq-based client implementation
//! - Response envelope and wire types

mod client;

pub use client::InboxApiClient;

use serde_json::Value as JsonValue;

use crate::models::UserCredentials;

/// Error raised before or during a request attempt, distinct from an HTTP
/// error status. Aborts the operation rather than producing a response.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("device API base URL is not configured")]
    MissingBaseUrl,
    #[error("request failed: {0}")]
    Transport(#[from] ureq::Error),
}

/// A decoded remote response: status class, optional body, and the
/// `Last-Modified` cursor when the endpoint supplies one.
#[derive(Debug)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub value: Option<T>,
    pub last_modified: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            value: None,
            last_modified: None,
        }
    }

    /// Any 2xx status
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Any 5xx status
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Stateless request/response mapping to the remote message center API.
///
/// Implementations carry no retry or persistence logic; retries belong to
/// the job scheduler and state to the store.
pub trait InboxApi: Send + Sync {
    /// Conditional fetch of the user's message list.
    ///
    /// A 304 response carries no body and is not an error.
    fn fetch_messages(
        &self,
        credentials: &UserCredentials,
        channel_id: &str,
        since: Option<&str>,
    ) -> Result<ApiResponse<Vec<JsonValue>>, RequestError>;

    /// Push a batch of reporting documents acknowledging locally read
    /// messages
    fn sync_read_state(
        &self,
        credentials: &UserCredentials,
        channel_id: &str,
        reportings: &[JsonValue],
    ) -> Result<ApiResponse<()>, RequestError>;

    /// Push a batch of reporting documents acknowledging locally deleted
    /// messages
    fn sync_deleted_state(
        &self,
        credentials: &UserCredentials,
        channel_id: &str,
        reportings: &[JsonValue],
    ) -> Result<ApiResponse<()>, RequestError>;

    /// Create a new user associated with the given channel
    fn create_user(&self, channel_id: &str) -> Result<ApiResponse<UserCredentials>, RequestError>;

    /// Re-associate an existing user with the given channel
    fn update_user(
        &self,
        credentials: &UserCredentials,
        channel_id: &str,
    ) -> Result<ApiResponse<()>, RequestError>;
}

/// Remote API wire types
pub mod api {
    use serde::Deserialize;
    use serde_json::Value as JsonValue;

    /// Response body from the message list endpoint. Individual messages are
    /// kept as raw JSON; the engine only interprets a handful of fields.
    #[derive(Debug, Deserialize)]
    pub struct MessageListResponse {
        pub messages: Option<Vec<JsonValue>>,
    }

    /// Response body from user creation
    #[derive(Debug, Deserialize)]
    pub struct CreatedUserResponse {
        pub user_id: String,
        pub password: String,
    }
}
