//! Global configuration: where the data API lives and how to reach it.
//!
//! # File format
//!
//! ```toml
//! base_url = "https://org.crm.dynamics.com"
//! api_version = "9.2"
//! access_token = "eyJ0eXAi..."
//! page_size = 25
//! request_timeout_secs = 60
//! ```
//!
//! Every field is optional. The file location defaults to
//! `~/.polylookup/config.toml` (`%LOCALAPPDATA%\polylookup\config.toml` on
//! Windows) and can be moved with `POLYLOOKUP_CONFIG`. `POLYLOOKUP_URL` and
//! `POLYLOOKUP_TOKEN` override the file's `base_url` and `access_token`, which
//! keeps tokens out of the file entirely if preferred.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::api::WebApiClient;
use crate::constants::{
    ACCESS_TOKEN_ENV, BASE_URL_ENV, CONFIG_PATH_ENV, DEFAULT_API_VERSION, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE, default_request_timeout,
};
use crate::core::LookupError;

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    default_request_timeout().as_secs()
}

/// User-wide settings for talking to the data API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Environment root URL, e.g. `https://org.crm.dynamics.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Web API version segment
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Search page size used when a control does not set one
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Timeout of a single request in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_version: default_api_version(),
            access_token: None,
            page_size: default_page_size(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl GlobalConfig {
    /// Load from `POLYLOOKUP_CONFIG` or the default location, then apply
    /// environment overrides. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Like [`load`](Self::load), but an explicit `path` wins over
    /// `POLYLOOKUP_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// when no path is given and the home directory cannot be determined.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(path) => PathBuf::from(path),
                None => Self::default_path()?,
            },
        };

        let mut config = if path.exists() {
            Self::load_from(&path).await?
        } else {
            tracing::debug!(target: "config", "No config at {}; using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a specific file, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this structure.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Replace `base_url` / `access_token` with `POLYLOOKUP_URL` /
    /// `POLYLOOKUP_TOKEN` when those are set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = std::env::var(BASE_URL_ENV).ok().filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(token) = std::env::var(ACCESS_TOKEN_ENV).ok().filter(|v| !v.trim().is_empty()) {
            self.access_token = Some(token);
        }
    }

    /// Default location of the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory is unknown.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("polylookup")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".polylookup")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Request timeout as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check the values that cannot be caught by parsing.
    ///
    /// # Errors
    ///
    /// [`LookupError::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), LookupError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(LookupError::ConfigError {
                message: format!("page_size must be between 1 and {MAX_PAGE_SIZE}, got {}", self.page_size),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(LookupError::ConfigError {
                message: "request_timeout_secs must be greater than zero".to_string(),
            });
        }
        match &self.base_url {
            Some(url) if !(url.starts_with("https://") || url.starts_with("http://")) => {
                Err(LookupError::ConfigError {
                    message: format!("base_url must be an http(s) URL, got '{url}'"),
                })
            }
            _ => Ok(()),
        }
    }

    /// Build a Web API client from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, has no `base_url`,
    /// or the HTTP client cannot be created.
    pub fn client(&self) -> Result<WebApiClient> {
        self.validate()?;
        let base_url = self.base_url.as_deref().ok_or_else(|| LookupError::ConfigError {
            message: format!("no environment URL configured (set base_url or {BASE_URL_ENV})"),
        })?;
        if self.access_token.is_none() {
            tracing::warn!(target: "config", "No access token configured; requests are sent unauthenticated");
        }
        WebApiClient::new(base_url, &self.api_version, self.access_token.clone(), self.request_timeout())
            .context("Failed to create Web API client")
    }
}
