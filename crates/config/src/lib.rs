//! Configuration and data directory handling for the SDK
//!
//! Provides utilities for locating the shared config directory
//! (~/.config/messagecenter/), loading and saving JSON records there, and
//! resolving paths for locally persisted data files such as the message
//! database.
//!
//! Call [`init`] once at startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Directory name under the platform config dir
const DIR_NAME: &str = "messagecenter";

/// Initialize the config directory.
///
/// Creates ~/.config/messagecenter/ if it doesn't exist.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the config directory (~/.config/messagecenter/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(DIR_NAME))
}

/// Get the path to a file within the config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Get the data directory (~/.local/share/messagecenter/), used for the
/// message database and other non-configuration state
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join(DIR_NAME))
}

/// Get the path to a file within the data directory, creating the directory
/// if needed
pub fn data_path(filename: &str) -> Result<PathBuf> {
    let dir = data_dir().context("Could not determine data directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
    Ok(dir.join(filename))
}

/// Load and parse a JSON file from the config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a file exists in the config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Save a value as JSON to a file in the config directory
pub fn save_json<T: Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    let path = dir.join(filename);
    save_json_file(&path, value)
}

/// Save a value as JSON to an arbitrary path
pub fn save_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Remove a file from the config directory, if present
pub fn remove(filename: &str) -> Result<()> {
    if let Some(path) = config_path(filename)
        && path.exists()
    {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("messagecenter"));
    }

    #[test]
    fn test_config_path() {
        let path = config_path("test.json");
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("messagecenter/test.json"));
    }

    #[test]
    fn test_save_and_load_json_file() {
        let dir = std::env::temp_dir().join("messagecenter-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.json");

        let value = serde_json::json!({"key": "value", "n": 3});
        save_json_file(&path, &value).unwrap();

        let loaded: serde_json::Value = load_json_file(&path).unwrap();
        assert_eq!(loaded, value);

        std::fs::remove_file(&path).unwrap();
    }
}
