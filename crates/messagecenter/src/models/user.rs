//! User credentials model

use serde::{Deserialize, Serialize};

/// Remote account credentials for the anonymous per-install user.
///
/// Assigned by the service on creation; the token authenticates all message
/// center requests for this user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub user_id: String,
    pub user_token: String,
}

impl UserCredentials {
    pub fn new(user_id: impl Into<String>, user_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_token: user_token.into(),
        }
    }
}
