//! Client configuration
//!
//! Options come from a YAML file, then `.env` / environment overrides.
//! Permission keys are secrets and only ever come from the environment.

use crate::logging::init_tracing_with_level;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const URL_ENV: &str = "PUBSUB_URL";
pub const SESSION_UUID_ENV: &str = "PUBSUB_SESSION_UUID";
pub const KEYS_ENV: &str = "PUBSUB_KEYS";
pub const CONFIG_PATH_ENV: &str = "PUBSUB_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Connection options for [`crate::Client`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Server endpoint, `ws://` or `wss://`
    pub url: String,
    /// Reconnect after abnormal drops
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Session to ask the server to resume on the first connect
    #[serde(default)]
    pub session_uuid: Option<Uuid>,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// Reconnect attempts made without waiting
    #[serde(default = "default_fast_retry_attempts")]
    pub fast_retry_attempts: usize,
    /// Wait between attempts once the fast ones are used up
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_keepalive_interval_secs() -> u64 {
    120
}

fn default_fast_retry_attempts() -> usize {
    5
}

fn default_retry_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_reconnect: default_auto_reconnect(),
            connect_timeout_secs: default_connect_timeout_secs(),
            session_uuid: None,
            keepalive_interval_secs: default_keepalive_interval_secs(),
            fast_retry_attempts: default_fast_retry_attempts(),
            retry_interval_secs: default_retry_interval_secs(),
            log_level: default_log_level(),
        }
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_session_uuid(mut self, session: Uuid) -> Self {
        self.session_uuid = Some(session);
        self
    }

    pub fn with_keepalive_interval_secs(mut self, secs: u64) -> Self {
        self.keepalive_interval_secs = secs;
        self
    }

    pub fn with_retry_policy(mut self, fast_attempts: usize, interval_secs: u64) -> Self {
        self.fast_retry_attempts = fast_attempts;
        self.retry_interval_secs = interval_secs;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Load options from a YAML file, then apply `.env` and environment overrides
    ///
    /// Also installs the tracing subscriber at `log_level` if none is set yet.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut options: ClientOptions = serde_yaml::from_str(&yaml_content)?;

        dotenv::dotenv().ok();

        if let Ok(url) = std::env::var(URL_ENV) {
            info!("Overriding server URL from environment variable");
            options.url = url;
        }

        if let Ok(session) = std::env::var(SESSION_UUID_ENV) {
            let session = Uuid::parse_str(session.trim()).map_err(|e| {
                ConfigError::ValidationError(format!("{} is not a UUID: {}", SESSION_UUID_ENV, e))
            })?;
            info!("Resuming session {} from environment variable", session);
            options.session_uuid = Some(session);
        }

        options.validate()?;
        init_tracing_with_level(&options.log_level);
        options.log();
        Ok(options)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(ConfigError::ValidationError("url cannot be empty".to_string()));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "keepalive_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.retry_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retry_interval_secs must be greater than 0".to_string(),
            ));
        }
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Server URL: {}", self.url);
        info!("  Auto reconnect: {}", self.auto_reconnect);
        info!("  Connect timeout: {} seconds", self.connect_timeout_secs);
        info!("  Keepalive interval: {} seconds", self.keepalive_interval_secs);
        info!(
            "  Retry policy: {} immediate, then every {} seconds",
            self.fast_retry_attempts, self.retry_interval_secs
        );
        info!("  Session: {}", self.session_uuid.map(|s| s.to_string()).unwrap_or_else(|| "new".into()));
        info!("  Log level: {}", self.log_level);
    }
}

/// Read permission keys from `PUBSUB_KEYS` (comma separated)
pub fn load_keys_from_env() -> Result<Vec<String>> {
    dotenv::dotenv().ok();

    let raw = std::env::var(KEYS_ENV).map_err(|_| ConfigError::EnvVarMissing(KEYS_ENV.to_string()))?;
    let keys: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(String::from)
        .collect();

    if keys.is_empty() {
        return Err(ConfigError::ValidationError(format!("{} contains no keys", KEYS_ENV)));
    }
    Ok(keys)
}

/// Config file path from `PUBSUB_CONFIG_PATH`, or `config.yaml`
pub fn config_path_from_env() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
        .into()
}
