use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

use crate::execution::tracker::TrackerConfig;
use crate::execution::types::Chain;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Include dependency (reqwest/hyper) spans in the log filter
    #[serde(default)]
    pub enable_tracing: bool,
    pub backend: BackendConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Default wallet session for the CLI (overridable by flags)
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    /// e.g. `https://wallet.example.com/api/v1`
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    pub device_id: String,
    pub wallet_id: String,
    pub chain: Chain,
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "backend.base_url must be an http(s) URL, got {:?}",
                self.backend.base_url
            )));
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "backend.request_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.tracker.max_poll_attempts == 0 {
            return Err(ConfigError::Invalid(
                "tracker.max_poll_attempts must be > 0".to_string(),
            ));
        }
        if self.tracker.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tracker.poll_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
