//! Runtime configuration for the message center
//!
//! Supports loading credentials and endpoints from (in order of priority):
//! 1. JSON file (~/.config/messagecenter/messagecenter.json)
//! 2. Runtime environment variables (fallback)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration filename in the config directory
const CONFIG_FILE: &str = "messagecenter.json";

/// Runtime configuration: application credentials and the device API host.
///
/// `app_key`/`app_secret` authenticate user creation; all other requests use
/// the created user's own credentials. `device_api_url` is the base URL for
/// every message center request; without it the remote client refuses to
/// build requests.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub app_key: String,
    pub app_secret: String,
    pub device_api_url: Option<String>,
}

/// On-disk configuration file format
#[derive(Deserialize)]
struct ConfigFile {
    app_key: String,
    app_secret: String,
    #[serde(default)]
    device_api_url: Option<String>,
}

impl RuntimeConfig {
    pub fn new(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        device_api_url: impl Into<String>,
    ) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            device_api_url: Some(device_api_url.into()),
        }
    }

    /// Load configuration using the following priority:
    /// 1. JSON file (~/.config/messagecenter/messagecenter.json)
    /// 2. Runtime environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(CONFIG_FILE) {
            let file: ConfigFile = config::load_json(CONFIG_FILE)?;
            return Ok(Self::from_config_file(file));
        }

        Self::from_env()
    }

    /// Load configuration from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file: ConfigFile = config::load_json_file(path)?;
        Ok(Self::from_config_file(file))
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_json::from_str(json).context("Failed to parse configuration JSON")?;
        Ok(Self::from_config_file(file))
    }

    fn from_config_file(file: ConfigFile) -> Self {
        Self {
            app_key: file.app_key,
            app_secret: file.app_secret,
            device_api_url: file.device_api_url,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app_key = std::env::var("MESSAGECENTER_APP_KEY")
            .context("MESSAGECENTER_APP_KEY environment variable not set")?;
        let app_secret = std::env::var("MESSAGECENTER_APP_SECRET")
            .context("MESSAGECENTER_APP_SECRET environment variable not set")?;
        let device_api_url = std::env::var("MESSAGECENTER_DEVICE_API_URL").ok();

        Ok(Self {
            app_key,
            app_secret,
            device_api_url,
        })
    }

    /// Check if configuration is available (file or env vars)
    pub fn is_available() -> bool {
        if config::config_exists(CONFIG_FILE) {
            return true;
        }
        std::env::var("MESSAGECENTER_APP_KEY").is_ok()
            && std::env::var("MESSAGECENTER_APP_SECRET").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "app_key": "test-app-key",
            "app_secret": "test-app-secret",
            "device_api_url": "https://device-api.example.com"
        }"#;

        let config = RuntimeConfig::from_json(json).unwrap();
        assert_eq!(config.app_key, "test-app-key");
        assert_eq!(config.app_secret, "test-app-secret");
        assert_eq!(
            config.device_api_url.as_deref(),
            Some("https://device-api.example.com")
        );
    }

    #[test]
    fn test_parse_config_without_url() {
        let json = r#"{
            "app_key": "test-app-key",
            "app_secret": "test-app-secret"
        }"#;

        let config = RuntimeConfig::from_json(json).unwrap();
        assert!(config.device_api_url.is_none());
    }

    #[test]
    fn test_invalid_json() {
        assert!(RuntimeConfig::from_json(r#"{ "other": {} }"#).is_err());
    }
}
