//! Client configuration.
//!
//! `ClientConfig` holds what a `SessionClient` needs at runtime and is
//! assembled through `SessionClient::builder()`. `Settings` is the small
//! user-editable file the command-line front end keeps at
//! `~/.config/gamerlink/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "gamerlink";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default name of the persisted session record
pub const DEFAULT_STORAGE_KEY: &str = "gamerlink_session";

/// Default prefix for outward notification names
pub const DEFAULT_NAMESPACE: &str = "gamerlink";

/// Default auto-verify period (5 minutes)
pub const DEFAULT_AUTO_VERIFY_INTERVAL: Duration = Duration::from_millis(300_000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, always ending with `/`
    pub api_root: String,
    pub storage_dir: PathBuf,
    pub storage_key: String,
    pub namespace: String,
    /// None defers to the transport's own timeout behavior
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
    pub auto_verify_interval: Duration,
}

impl ClientConfig {
    /// Where sessions are stored when no directory is configured
    pub fn default_storage_dir() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(|| PathBuf::from(".").join(format!(".{}", APP_NAME)))
    }

    /// Validate an API root and normalize it to end with `/`
    pub fn normalize_api_root(api_root: &str) -> Result<String> {
        let trimmed = api_root.trim();
        if trimmed.is_empty() {
            return Err(Error::Config("api_root is required".to_string()));
        }
        let url = reqwest::Url::parse(trimmed)
            .map_err(|e| Error::Config(format!("Invalid api_root '{}': {}", trimmed, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!("Unsupported api_root scheme: {}", url.scheme())));
        }
        let mut normalized = url.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        Ok(normalized)
    }

    /// Storage keys become file names, so keep them to a safe alphabet
    pub fn validate_storage_key(key: &str) -> Result<()> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if valid {
            Ok(())
        } else {
            Err(Error::Config(format!("Invalid storage key: '{}'", key)))
        }
    }
}

/// Persisted front-end settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    pub api_root: Option<String>,
    pub storage_key: Option<String>,
    pub namespace: Option<String>,
    pub last_email: Option<String>,
}

impl Settings {
    pub fn load() -> std::io::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> std::io::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
    }

    fn config_path() -> std::io::Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "Could not find config directory")
        })?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
