//! Startup configuration.
//!
//! Loaded once before anything else starts; a missing or malformed file
//! is fatal. Two layouts are accepted, chosen by file extension:
//!
//! ```toml
//! # config.toml
//! token = "123456:ABC-DEF"
//! whitelist = [11111111, 22222222]
//! poll_interval_secs = 5            # optional, 1..=3600
//! api_url = "https://api.telegram.org"  # optional
//! ```
//!
//! or the same keys as JSON in a `.json` file.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use gpuwatch_core::PollInterval;
use gpuwatch_protocol::ChatId;

use crate::transport::DEFAULT_API_URL;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GPUWATCH_CONFIG";

/// Config file used when neither flag nor environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {}; create it with a `token` and a `whitelist`", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {error}", .path.display())]
    Read { path: PathBuf, error: String },

    #[error("failed to parse {}: {error}", .path.display())]
    Parse { path: PathBuf, error: String },

    #[error("`token` must not be empty")]
    EmptyToken,
}

// ============================================================================
// Whitelist
// ============================================================================

/// Ordered set of subscriber ids allowed to run privileged commands and
/// receive notifications. Immutable after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<ChatId>")]
pub struct Whitelist(Vec<ChatId>);

impl Whitelist {
    /// Builds a whitelist, dropping repeated ids but keeping first-seen order.
    pub fn new(ids: impl IntoIterator<Item = ChatId>) -> Self {
        let mut unique = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Self(unique)
    }

    #[must_use]
    pub fn contains(&self, id: ChatId) -> bool {
        self.0.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ChatId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ChatId>> for Whitelist {
    fn from(ids: Vec<ChatId>) -> Self {
        Self::new(ids)
    }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Clone, Deserialize)]
pub struct Config {
    /// Bot API access token
    pub token: String,

    pub whitelist: Whitelist,

    #[serde(default, rename = "poll_interval_secs")]
    pub poll_interval: PollInterval,

    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("whitelist", &self.whitelist)
            .field("poll_interval", &self.poll_interval)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Config {
    /// Loads the config file at `path`.
    ///
    /// # Errors
    /// - `ConfigError::NotFound` if the file does not exist
    /// - `ConfigError::Parse` if it is malformed or lacks a required field
    /// - `ConfigError::EmptyToken` if the token is blank
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::Read {
                path: path.to_path_buf(),
                error: e.to_string(),
            },
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str::<Config>(&contents).map_err(|e| e.to_string())
        } else {
            toml::from_str::<Config>(&contents).map_err(|e| e.to_string())
        };

        let config = parsed.map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        Ok(())
    }
}

/// Picks the config path: explicit flag, then `GPUWATCH_CONFIG`, then
/// `config.toml` in the working directory.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
