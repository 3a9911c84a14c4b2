//! Configuration management for the relay.
//!
//! Handles loading, saving, and validating configuration from
//! the platform-specific config directory or an explicit path.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "pixiv-relay";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Browser user agent used when none is configured.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the listener binds to.
    pub bind_address: String,

    /// Listening port.
    pub port: u16,

    /// User agent sent on every upstream request.
    pub user_agent: String,

    /// Session cookie forwarded on metadata requests.
    pub cookie: Option<String>,

    /// Upstream site settings.
    pub upstream: UpstreamConfig,

    /// On-disk image store settings.
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookie: None,
            upstream: UpstreamConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// How illustration metadata is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataStrategy {
    /// JSON endpoint under `/ajax/illust/<id>`.
    Api,
    /// Preload data embedded in the artwork page.
    Html,
    /// JSON endpoint first, artwork page when it is unreachable or malformed.
    ApiThenHtml,
}

/// Upstream site configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Metadata retrieval strategy.
    pub strategy: MetadataStrategy,

    /// Origin of the metadata endpoints.
    pub base_url: String,

    /// Referer sent with every upstream request.
    pub referer: String,

    /// Language requested from upstream.
    pub language: String,

    /// Connect and read timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            strategy: MetadataStrategy::Api,
            base_url: "https://www.pixiv.net".to_string(),
            referer: "https://www.pixiv.net/".to_string(),
            language: "en".to_string(),
            timeout_secs: 30,
        }
    }
}

/// On-disk image store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Persist one copy of every relayed image.
    pub enabled: bool,

    /// Directory the images are written to.
    pub directory: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("store"),
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from a specific path.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "port".to_string(),
                message: "must be between 1 and 65535".to_string(),
            });
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingValue("user_agent".to_string()));
        }

        let base_url = url::Url::parse(&self.upstream.base_url).map_err(|e| {
            ConfigError::InvalidValue {
                key: "upstream.base_url".to_string(),
                message: e.to_string(),
            }
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "upstream.base_url".to_string(),
                message: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "upstream.timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.store.enabled && self.store.directory.as_os_str().is_empty() {
            return Err(ConfigError::MissingValue("store.directory".to_string()));
        }

        Ok(())
    }

    /// Returns the session cookie, treating a blank value as absent.
    pub fn session_cookie(&self) -> Option<&str> {
        self.cookie
            .as_deref()
            .map(str::trim)
            .filter(|cookie| !cookie.is_empty())
    }

    /// Returns the origin without a trailing slash.
    pub fn upstream_origin(&self) -> &str {
        self.upstream.base_url.trim_end_matches('/')
    }
}
