//! Application configuration.
//!
//! # Responsibility
//! - Load settings from an optional TOML file.
//! - Apply `UPARTNERS_*` environment overrides on top of the file.
//!
//! # Invariants
//! - A missing config file yields defaults, never an error.
//! - Unknown TOML keys are rejected.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "UPARTNERS_DB_PATH";
pub const ENV_HOSTNAME: &str = "UPARTNERS_HOSTNAME";
pub const ENV_LOG_LEVEL: &str = "UPARTNERS_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "UPARTNERS_LOG_DIR";
pub const ENV_STORAGE_DIR: &str = "UPARTNERS_STORAGE_DIR";
pub const ENV_OUTBOX_DIR: &str = "UPARTNERS_OUTBOX_DIR";
pub const ENV_API_URL: &str = "UPARTNERS_API_URL";
pub const ENV_EMAIL_FROM: &str = "UPARTNERS_EMAIL_FROM";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        key: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config `{}`: {source}", path.display())
            }
            Self::InvalidValue { key, message } => write!(f, "invalid `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::InvalidValue { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Public host used in emailed links.
    pub hostname: String,
    /// Base URL of the messaging platform.
    pub api_url: String,
    pub api_timeout_secs: u64,
    pub email_from: String,
    pub log_level: String,
    /// Defaults to `<data dir>/logs` when unset.
    pub log_dir: Option<PathBuf>,
    pub storage_dir: PathBuf,
    pub outbox_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("upartners.sqlite3"),
            hostname: "localhost:8000".to_string(),
            api_url: "https://rapidpro.io".to_string(),
            api_timeout_secs: 30,
            email_from: "U-Partners <no-reply@localhost>".to_string(),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            storage_dir: PathBuf::from("media"),
            outbox_dir: PathBuf::from("outbox"),
        }
    }
}

impl AppConfig {
    /// Reads `path` when it exists, then applies process environment
    /// overrides.
    ///
    /// The result is not validated; callers layer their own overrides and
    /// call [`AppConfig::validate`] once at the end.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Overrides fields from `lookup`; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(ENV_DB_PATH) {
            self.db_path = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_HOSTNAME) {
            self.hostname = value.trim().to_string();
        }
        if let Some(value) = get(ENV_LOG_LEVEL) {
            self.log_level = value;
        }
        if let Some(value) = get(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = get(ENV_STORAGE_DIR) {
            self.storage_dir = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_OUTBOX_DIR) {
            self.outbox_dir = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_API_URL) {
            self.api_url = value.trim().to_string();
        }
        if let Some(value) = get(ENV_EMAIL_FROM) {
            self.email_from = value;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.trim().is_empty() || self.hostname.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "hostname",
                message: format!("expected a bare host, got `{}`", self.hostname),
            });
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "api_url",
                message: format!("expected an http(s) URL, got `{}`", self.api_url),
            });
        }
        if self.api_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api_timeout_secs",
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}
