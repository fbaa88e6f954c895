//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::feed::PendingOrder;
use crate::store::CollectionPath;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application identity and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Namespaces the message collection
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Pre-issued credential token; anonymous sign-in when absent
    #[serde(default)]
    pub initial_auth_token: Option<String>,
}

fn default_app_id() -> String {
    "default-app-id".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            initial_auth_token: None,
        }
    }
}

/// Feed ordering configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub pending_order: PendingOrder,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("rtchat").join("config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(app_id) = std::env::var("RTCHAT_APP_ID") {
            self.app.app_id = app_id;
        }
        if let Ok(token) = std::env::var("RTCHAT_AUTH_TOKEN") {
            self.app.initial_auth_token = Some(token);
        }

        if let Ok(level) = std::env::var("RTCHAT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("RTCHAT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Path of the shared message collection for this app
    pub fn collection_path(&self) -> CollectionPath {
        CollectionPath::public_messages(&self.app.app_id)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# rtchat Configuration
#
# Environment variables override these settings:
# - RTCHAT_APP_ID
# - RTCHAT_AUTH_TOKEN
# - RTCHAT_LOG_LEVEL
# - RTCHAT_LOG_FORMAT

[app]
# Application id; messages live under /artifacts/<app_id>/public/data/messages
app_id = "default-app-id"

# Pre-issued credential token (omit for anonymous sign-in)
# initial_auth_token = ""

[feed]
# Placement of messages still waiting for a server timestamp: last or first
pending_order = "last"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
