//! Message center API HTTP client
//!
//! Stateless request/response mapping to the device API. Uses synchronous
//! HTTP (ureq) to be executor-agnostic.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::debug;
use serde_json::{Value as JsonValue, json};

use super::api::{CreatedUserResponse, MessageListResponse};
use super::{ApiResponse, InboxApi, RequestError};
use crate::config::RuntimeConfig;
use crate::models::UserCredentials;

const ACCEPT_HEADER: &str = "application/vnd.messagecenter+json; version=3;";
const CHANNEL_HEADER: &str = "X-Device-Channel-ID";

/// HTTP client for the message center device API
pub struct InboxApiClient {
    config: RuntimeConfig,
}

impl InboxApiClient {
    /// Create a new client from runtime configuration
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    fn base_url(&self) -> Result<&str, RequestError> {
        self.config
            .device_api_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .ok_or(RequestError::MissingBaseUrl)
    }

    fn user_auth(credentials: &UserCredentials) -> String {
        basic_auth(&credentials.user_id, &credentials.user_token)
    }

    fn app_auth(&self) -> String {
        basic_auth(&self.config.app_key, &self.config.app_secret)
    }
}

fn basic_auth(name: &str, secret: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{name}:{secret}")))
}

impl InboxApi for InboxApiClient {
    fn fetch_messages(
        &self,
        credentials: &UserCredentials,
        channel_id: &str,
        since: Option<&str>,
    ) -> Result<ApiResponse<Vec<JsonValue>>, RequestError> {
        let url = format!(
            "{}/api/user/{}/messages/",
            self.base_url()?,
            credentials.user_id
        );

        let mut request = ureq::get(&url)
            .header("Authorization", &Self::user_auth(credentials))
            .header("Accept", ACCEPT_HEADER)
            .header(CHANNEL_HEADER, channel_id);
        if let Some(cursor) = since {
            request = request.header("If-Modified-Since", cursor);
        }

        match request.call() {
            Ok(mut response) => {
                let status = response.status().as_u16();
                let last_modified = response
                    .headers()
                    .get("Last-Modified")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body: MessageListResponse = response.body_mut().read_json()?;
                Ok(ApiResponse {
                    status,
                    value: Some(body.messages.unwrap_or_default()),
                    last_modified,
                })
            }
            Err(ureq::Error::StatusCode(code)) => Ok(ApiResponse::new(code)),
            Err(e) => Err(RequestError::Transport(e)),
        }
    }

    fn sync_read_state(
        &self,
        credentials: &UserCredentials,
        channel_id: &str,
        reportings: &[JsonValue],
    ) -> Result<ApiResponse<()>, RequestError> {
        let url = format!(
            "{}/api/user/{}/messages/unread/",
            self.base_url()?,
            credentials.user_id
        );
        self.post_reportings(&url, credentials, channel_id, reportings)
    }

    fn sync_deleted_state(
        &self,
        credentials: &UserCredentials,
        channel_id: &str,
        reportings: &[JsonValue],
    ) -> Result<ApiResponse<()>, RequestError> {
        let url = format!(
            "{}/api/user/{}/messages/delete/",
            self.base_url()?,
            credentials.user_id
        );
        self.post_reportings(&url, credentials, channel_id, reportings)
    }

    fn create_user(&self, channel_id: &str) -> Result<ApiResponse<UserCredentials>, RequestError> {
        let url = format!("{}/api/user/", self.base_url()?);
        let payload = json!({ "channels": [channel_id] });

        debug!("Creating message center user for channel {channel_id}");
        match ureq::post(&url)
            .header("Authorization", &self.app_auth())
            .header("Accept", ACCEPT_HEADER)
            .send_json(&payload)
        {
            Ok(mut response) => {
                let status = response.status().as_u16();
                let body: CreatedUserResponse = response.body_mut().read_json()?;
                Ok(ApiResponse {
                    status,
                    value: Some(UserCredentials::new(body.user_id, body.password)),
                    last_modified: None,
                })
            }
            Err(ureq::Error::StatusCode(code)) => Ok(ApiResponse::new(code)),
            Err(e) => Err(RequestError::Transport(e)),
        }
    }

    fn update_user(
        &self,
        credentials: &UserCredentials,
        channel_id: &str,
    ) -> Result<ApiResponse<()>, RequestError> {
        let url = format!("{}/api/user/{}/", self.base_url()?, credentials.user_id);
        let payload = json!({ "channels": { "add": [channel_id] } });

        debug!("Updating message center user {}", credentials.user_id);
        match ureq::post(&url)
            .header("Authorization", &Self::user_auth(credentials))
            .header("Accept", ACCEPT_HEADER)
            .send_json(&payload)
        {
            Ok(response) => Ok(ApiResponse::new(response.status().as_u16())),
            Err(ureq::Error::StatusCode(code)) => Ok(ApiResponse::new(code)),
            Err(e) => Err(RequestError::Transport(e)),
        }
    }
}

impl InboxApiClient {
    fn post_reportings(
        &self,
        url: &str,
        credentials: &UserCredentials,
        channel_id: &str,
        reportings: &[JsonValue],
    ) -> Result<ApiResponse<()>, RequestError> {
        // The reporting documents are echoed back verbatim
        let payload = json!({ "messages": reportings });

        match ureq::post(url)
            .header("Authorization", &Self::user_auth(credentials))
            .header("Accept", ACCEPT_HEADER)
            .header(CHANNEL_HEADER, channel_id)
            .send_json(&payload)
        {
            Ok(response) => Ok(ApiResponse::new(response.status().as_u16())),
            Err(ureq::Error::StatusCode(code)) => Ok(ApiResponse::new(code)),
            Err(e) => Err(RequestError::Transport(e)),
        }
    }
}
