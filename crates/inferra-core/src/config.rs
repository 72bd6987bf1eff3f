//! Client configuration.
//!
//! Values are resolved in layers, later layers winning:
//!
//! 1. built-in defaults
//! 2. an optional JSON config file
//! 3. environment (`INFERRA_API_URL`, `INFERRA_DATA_DIR`)
//! 4. command-line flags (applied by the binary)
//!
//! ```json
//! {
//!   "apiUrl": "http://localhost:8000",
//!   "timeoutMs": 30000,
//!   "dataDir": "/home/me/.config/inferra",
//!   "charIntervalMs": 8,
//!   "lineIntervalMs": 30
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{DEFAULT_API_URL, DEFAULT_TIMEOUT};
use crate::reveal::{RevealConfig, DEFAULT_CHAR_INTERVAL, DEFAULT_LINE_INTERVAL};

pub const ENV_API_URL: &str = "INFERRA_API_URL";
pub const ENV_DATA_DIR: &str = "INFERRA_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Home directory not set")]
    NoHomeDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Base URL of the Q&A backend.
    pub api_url: String,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Where sessions are persisted. Defaults to `~/.config/inferra`.
    pub data_dir: Option<PathBuf>,

    pub char_interval_ms: u64,
    pub line_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            data_dir: None,
            char_interval_ms: DEFAULT_CHAR_INTERVAL.as_millis() as u64,
            line_interval_ms: DEFAULT_LINE_INTERVAL.as_millis() as u64,
        }
    }
}

impl Config {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from environment variables found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reveal_config(&self) -> RevealConfig {
        RevealConfig {
            char_interval: Duration::from_millis(self.char_interval_ms),
            line_interval: Duration::from_millis(self.line_interval_ms),
        }
    }

    /// The configured data directory, or `~/.config/inferra`.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(|key| std::env::var(key).ok()),
        }
    }
}

/// `~/.config/inferra`, with home taken from HOME, then USERPROFILE.
pub fn default_data_dir<F>(lookup: F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let home = ["HOME", "USERPROFILE"]
        .iter()
        .find_map(|key| lookup(key).filter(|v| !v.is_empty()))
        .ok_or(ConfigError::NoHomeDir)?;
    Ok(PathBuf::from(home).join(".config").join("inferra"))
}
