//! Client configuration.
//!
//! Resolved in layers, later ones winning: built-in defaults, the JSON
//! config file, environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::ClientOptions;
use crate::jobs::PollerConfig;

/// Config directory under the home directory.
const CONFIG_DIR: &str = ".catalogctl";
const CONFIG_FILE: &str = "config.json";

/// Admin API root of a locally running backend.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1/admin";

pub const ENV_API_URL: &str = "CATALOG_API_URL";
pub const ENV_API_KEY: &str = "CATALOG_ADMIN_API_KEY";
pub const ENV_POLL_INTERVAL_MS: &str = "CATALOG_POLL_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CATALOG_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Admin API base URL.
    pub api_url: String,
    /// Value of the `X-Admin-API-Key` header.
    pub api_key: String,
    /// Job status polling interval.
    pub poll_interval_ms: u64,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// TCP connect timeout.
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            poll_interval_ms: 2000,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    /// `~/.catalogctl/config.json`, if there is a home directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load an explicit config file, or the default one if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Override settings from environment variables, read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_POLL_INTERVAL_MS} must be a number, got {raw:?}"))?;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = raw.trim().parse().with_context(|| {
                format!("{ENV_REQUEST_TIMEOUT_SECS} must be a number, got {raw:?}")
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            bail!("API URL must start with http:// or https://, got {:?}", self.api_url);
        }
        if self.poll_interval_ms == 0 {
            bail!("Poll interval must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("Request timeout must be greater than zero");
        }
        if self.connect_timeout_secs == 0 {
            bail!("Connect timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub const fn poller_config(&self) -> PollerConfig {
        PollerConfig::every(Duration::from_millis(self.poll_interval_ms))
    }
}
