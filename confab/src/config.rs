use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client settings stored in `~/.confab/config.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Tell the server about model changes via `POST /set_model`.
    #[serde(default)]
    pub sync_model: bool,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            default_model: None,
            request_timeout_secs: None,
            sync_model: false,
        }
    }
}

/// `~/.confab`, holding the config file and the log.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".confab")
}

impl ClientConfig {
    pub fn config_path() -> PathBuf {
        config_dir().join("config.json")
    }

    /// Load from ~/.confab/config.json. Missing or malformed files yield `None`.
    pub fn load() -> Option<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring malformed config: {e}");
                None
            }
        }
    }

    /// Save to ~/.confab/config.json
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.server_url, "http://127.0.0.1:5000");
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ClientConfig {
            server_url: "http://chat.local:8080".into(),
            default_model: Some("gpt-4o".into()),
            request_timeout_secs: Some(30),
            sync_model: true,
        };
        config.save_to(&path).unwrap();
        assert_eq!(ClientConfig::load_from(&path), Some(config));
    }

    #[test]
    fn malformed_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(ClientConfig::load_from(&path), None);
        assert_eq!(ClientConfig::load_from(&dir.path().join("missing.json")), None);
    }

    #[test]
    fn unset_optionals_are_not_written() {
        let json = serde_json::to_value(ClientConfig::default()).unwrap();
        assert!(json.get("default_model").is_none());
        assert_eq!(json["sync_model"], false);
    }
}
