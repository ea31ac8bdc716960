//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, the session check interval, where the session is stored, and
//! the last used username.
//!
//! Configuration is stored at `~/.config/bookvault/config.json`. The
//! `BOOKVAULT_API_BASE_URL` and `BOOKVAULT_SESSION_DIR` environment
//! variables override the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "bookvault";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session subdirectory under the platform data directory
const SESSION_DIR: &str = "session";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Seconds between background session expiry checks.
const DEFAULT_SESSION_CHECK_INTERVAL_SECS: u64 = 60;

pub const ENV_API_BASE_URL: &str = "BOOKVAULT_API_BASE_URL";
pub const ENV_SESSION_DIR: &str = "BOOKVAULT_SESSION_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub session_check_interval_secs: u64,
    pub session_dir: Option<PathBuf>,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            session_check_interval_secs: DEFAULT_SESSION_CHECK_INTERVAL_SECS,
            session_dir: None,
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent) and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        Ok(Self::load_from(&Self::config_path()?)?.with_env())
    }

    /// Apply the environment overrides to this config.
    pub fn with_env(mut self) -> Self {
        self.apply_env(|key| std::env::var(key).ok());
        self
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(dir) = var(ENV_SESSION_DIR).filter(|v| !v.trim().is_empty()) {
            self.session_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session entries.
    pub fn session_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.session_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(SESSION_DIR))
    }

    pub fn session_check_interval(&self) -> Duration {
        Duration::from_secs(self.session_check_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.session_check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_base_url: "https://library.example.org".into(),
            last_username: Some("ada@example.com".into()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"last_username":"ada"}"#).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.last_username.as_deref(), Some("ada"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_API_BASE_URL => Some("http://10.0.0.5:9000".to_string()),
            ENV_SESSION_DIR => Some("/tmp/bookvault-session".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://10.0.0.5:9000");
        assert_eq!(config.session_dir().unwrap(), PathBuf::from("/tmp/bookvault-session"));
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let mut config = Config::default();
        config.apply_env(|_| Some("  ".to_string()));
        assert_eq!(config, Config::default());
    }
}
