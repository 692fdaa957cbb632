//! Configuration management for Rival.
//!
//! Configuration is loaded in order of precedence:
//! 1. Defaults
//! 2. Config file (~/.rival/config.toml)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Upstream API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Ordered list of API keys handed out round-robin
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Gemini model selection and request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Model used for chat completions and function-call dispatch
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for image generation and editing
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Per-request timeout in seconds (0 = no timeout)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chat_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            image_model: default_image_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Daily usage quota for image-producing operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Image operations per calendar day for non-subscribed profiles
    #[serde(default = "default_daily_image_limit")]
    pub daily_image_limit: u32,
}

fn default_daily_image_limit() -> u32 {
    20
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            daily_image_limit: default_daily_image_limit(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub usage: UsageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Returns the default Rival data directory (~/.rival)
    pub fn rival_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".rival"))
    }

    /// Returns the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::rival_dir().map(|d| d.join("config.toml"))
    }

    /// Returns the default sessions blob path
    pub fn default_sessions_path() -> Option<PathBuf> {
        Self::rival_dir().map(|d| d.join("sessions.json"))
    }

    /// Returns the default usage counter path
    pub fn default_usage_path() -> Option<PathBuf> {
        Self::rival_dir().map(|d| d.join("usage.json"))
    }

    /// Returns the default profile blob path
    pub fn default_profile_path() -> Option<PathBuf> {
        Self::rival_dir().map(|d| d.join("profile.json"))
    }

    /// Load configuration from the default path with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = Self::default_config_path() {
            if path.exists() {
                Self::load_from_file(&path)?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // RIVAL_API_KEYS is a comma-separated list
        if let Ok(raw) = std::env::var("RIVAL_API_KEYS") {
            let keys: Vec<String> = raw
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            if !keys.is_empty() {
                self.credentials.api_keys = keys;
            }
        }

        if let Ok(model) = std::env::var("RIVAL_CHAT_MODEL") {
            self.gemini.chat_model = model;
        }

        if let Ok(model) = std::env::var("RIVAL_IMAGE_MODEL") {
            self.gemini.image_model = model;
        }

        if let Ok(limit) = std::env::var("RIVAL_IMAGE_LIMIT") {
            if let Ok(limit) = limit.parse() {
                self.usage.daily_image_limit = limit;
            }
        }

        if let Ok(level) = std::env::var("RIVAL_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate startup invariants.
    ///
    /// An empty credential list is fatal: no per-call recovery exists for a
    /// system that cannot reach upstream at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.api_keys.is_empty() {
            return Err(ConfigError::ValidationError(
                "no API keys configured: set RIVAL_API_KEYS or [credentials] api_keys".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a specific file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Ensure the Rival data directory exists
    pub fn ensure_dirs() -> std::io::Result<()> {
        if let Some(dir) = Self::rival_dir() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
