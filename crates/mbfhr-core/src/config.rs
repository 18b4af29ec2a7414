//! Application configuration management.
//!
//! Holds the backend URL, timeouts, where session tokens are kept and the last
//! used username. Stored at `~/.config/mbfhr/config.json`; `MBF_BACKEND_URL`
//! overrides the stored backend URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::REQUEST_TIMEOUT_SECS;
use crate::auth::{FileBackend, KeyringBackend, SessionConfig, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "mbfhr";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `base_url`
pub const BACKEND_URL_ENV: &str = "MBF_BACKEND_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Refresh calls are bounded by this unless configured otherwise.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Not persisted; every run starts signed out
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    pub token_storage: TokenStorage,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            token_storage: TokenStorage::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the stored config, or defaults if there is none, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(std::env::var(BACKEND_URL_ENV).ok());
        Ok(config)
    }

    fn apply_env(&mut self, backend_url: Option<String>) {
        if let Some(url) = backend_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            refresh_timeout: Duration::from_secs(self.refresh_timeout_secs),
        }
    }

    /// Open the token store this config selects.
    pub fn open_token_store(&self) -> Result<TokenStore> {
        Ok(match self.token_storage {
            TokenStorage::File => TokenStore::open(Box::new(FileBackend::new(self.cache_dir()?))),
            TokenStorage::Keyring => TokenStore::open(Box::new(KeyringBackend)),
            TokenStorage::Memory => TokenStore::in_memory(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.session_config().refresh_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.token_storage, TokenStorage::File);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{"base_url":"https://hr.example.to","token_storage":"keyring"}"#;
        let config: Config = serde_json::from_str(json).expect("parse config");
        assert_eq!(config.base_url, "https://hr.example.to");
        assert_eq!(config.token_storage, TokenStorage::Keyring);
        assert_eq!(config.refresh_timeout_secs, 10);
        assert_eq!(config.last_username, None);
    }

    #[test]
    fn test_env_override() {
        let mut config = Config::default();
        config.apply_env(Some("  ".to_string()));
        assert_eq!(config.base_url, "http://localhost:8000");
        config.apply_env(Some("https://api.mbf.to".to_string()));
        assert_eq!(config.base_url, "https://api.mbf.to");
        config.apply_env(None);
        assert_eq!(config.base_url, "https://api.mbf.to");
    }

    #[test]
    fn test_memory_store_starts_empty() {
        let config = Config {
            token_storage: TokenStorage::Memory,
            ..Config::default()
        };
        assert_eq!(config.open_token_store().expect("store").get(), None);
    }
}
