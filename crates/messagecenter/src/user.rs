//! Message center user identity
//!
//! Holds the anonymous per-install account credentials and their
//! channel association. The token is obfuscated before it hits disk; this
//! is a reversible transform to avoid plaintext at rest, not encryption.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::UserCredentials;

/// Credentials filename in the config directory
const USER_FILE: &str = "user.json";

/// Keystream for the at-rest token transform
const OBFUSCATION_KEY: &[u8] = b"fA9x2RkPm7qL0dWz";

/// Minimum interval between non-forceful user updates
fn update_interval() -> Duration {
    Duration::hours(24)
}

/// Listener notified whenever a user create/update attempt concludes
pub type UserListener = Arc<dyn Fn(bool) + Send + Sync>;

/// On-disk credential record. The token field holds the obfuscated form.
#[derive(Debug, Serialize, Deserialize)]
struct StoredUser {
    user_id: String,
    user_token: String,
    #[serde(default)]
    registered_channel_id: Option<String>,
    #[serde(default)]
    last_update_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct UserData {
    credentials: Option<UserCredentials>,
    registered_channel_id: Option<String>,
    last_update_at: Option<DateTime<Utc>>,
}

/// The message center user.
///
/// Absent until first successful creation; recreated wholesale when the
/// server reports the identity unauthorized; re-associated when the device
/// channel changes.
pub struct User {
    data: Mutex<UserData>,
    path: Option<PathBuf>,
    listeners: Mutex<Vec<(u64, UserListener)>>,
    next_listener_id: AtomicU64,
}

impl User {
    /// Load the user from its default config path
    pub fn load() -> Self {
        match config::config_path(USER_FILE) {
            Some(path) => Self::with_path(path),
            None => {
                warn!("Could not determine config directory; user will not persist");
                Self::in_memory()
            }
        }
    }

    /// Load the user from a specific path
    pub fn with_path(path: PathBuf) -> Self {
        let data = Self::read_from(&path);
        Self {
            data: Mutex::new(data),
            path: Some(path),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// A user that never touches disk (tests, ephemeral embedders)
    pub fn in_memory() -> Self {
        Self {
            data: Mutex::new(UserData::default()),
            path: None,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    fn read_from(path: &PathBuf) -> UserData {
        if !path.exists() {
            return UserData::default();
        }

        let stored: StoredUser = match config::load_json_file(path) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to read user record: {e}");
                return UserData::default();
            }
        };

        let Some(token) = deobfuscate(&stored.user_token) else {
            warn!("Stored user token is unreadable; discarding identity");
            return UserData::default();
        };

        UserData {
            credentials: Some(UserCredentials::new(stored.user_id, token)),
            registered_channel_id: stored.registered_channel_id,
            last_update_at: stored.last_update_at,
        }
    }

    fn persist(&self, data: &UserData) {
        let Some(path) = &self.path else {
            return;
        };

        let result = match &data.credentials {
            Some(credentials) => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                let stored = StoredUser {
                    user_id: credentials.user_id.clone(),
                    user_token: obfuscate(&credentials.user_token),
                    registered_channel_id: data.registered_channel_id.clone(),
                    last_update_at: data.last_update_at,
                };
                config::save_json_file(path, &stored)
            }
            None if path.exists() => {
                std::fs::remove_file(path).map_err(anyhow::Error::from)
            }
            None => Ok(()),
        };

        if let Err(e) = result {
            warn!("Failed to persist user record: {e}");
        }
    }

    /// Whether an identity exists (id and token both present)
    pub fn is_created(&self) -> bool {
        self.data.lock().unwrap().credentials.is_some()
    }

    /// The current credentials, if created
    pub fn credentials(&self) -> Option<UserCredentials> {
        self.data.lock().unwrap().credentials.clone()
    }

    /// The channel this identity was last associated with
    pub fn registered_channel_id(&self) -> Option<String> {
        self.data.lock().unwrap().registered_channel_id.clone()
    }

    /// Persist new credentials. Empty id or token clears the identity.
    pub fn set_credentials(&self, user_id: &str, user_token: &str) {
        let mut data = self.data.lock().unwrap();
        if user_id.is_empty() || user_token.is_empty() {
            *data = UserData::default();
        } else {
            data.credentials = Some(UserCredentials::new(user_id, user_token));
        }
        self.persist(&data);
    }

    /// True if no identity exists or it is associated with a different
    /// channel than the current one
    pub fn should_update(&self, current_channel_id: &str) -> bool {
        let data = self.data.lock().unwrap();
        match &data.credentials {
            None => true,
            Some(_) => data.registered_channel_id.as_deref() != Some(current_channel_id),
        }
    }

    /// Whether a non-forceful update is due. A last-update timestamp in the
    /// future (clock rollback) also forces an update.
    pub(crate) fn update_is_due(&self, now: DateTime<Utc>) -> bool {
        let data = self.data.lock().unwrap();
        match data.last_update_at {
            None => true,
            Some(last) => last > now || last + update_interval() < now,
        }
    }

    /// Record a successful creation
    pub(crate) fn on_created(&self, user_id: &str, user_token: &str, channel_id: &str) {
        debug!("Created user {user_id} for channel {channel_id}");
        let mut data = self.data.lock().unwrap();
        data.credentials = Some(UserCredentials::new(user_id, user_token));
        data.registered_channel_id = Some(channel_id.to_string());
        data.last_update_at = Some(Utc::now());
        self.persist(&data);
    }

    /// Record a successful re-association to a channel
    pub(crate) fn on_updated(&self, channel_id: &str) {
        let mut data = self.data.lock().unwrap();
        data.registered_channel_id = Some(channel_id.to_string());
        data.last_update_at = Some(Utc::now());
        self.persist(&data);
    }

    /// Forget the last update time so the next non-forceful update runs
    pub(crate) fn clear_last_update(&self) {
        let mut data = self.data.lock().unwrap();
        data.last_update_at = None;
        self.persist(&data);
    }

    /// Subscribe to create/update outcomes; returns a handle for removal
    pub fn add_listener(&self, listener: UserListener) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    /// Remove a previously registered listener
    pub fn remove_listener(&self, id: u64) {
        self.listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
    }

    /// Notify listeners that a create/update attempt concluded
    pub(crate) fn on_user_updated(&self, success: bool) {
        let snapshot: Vec<UserListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(success);
        }
    }
}

fn obfuscate(token: &str) -> String {
    let bytes: Vec<u8> = token
        .bytes()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    BASE64.encode(bytes)
}

fn deobfuscate(stored: &str) -> Option<String> {
    let bytes = BASE64.decode(stored).ok()?;
    let plain: Vec<u8> = bytes
        .iter()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    String::from_utf8(plain).ok()
}
