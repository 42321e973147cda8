// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Storage configuration.
//
// The backend kind is chosen once at startup. Values come from serde (config
// files, tests) or from `TWINSTORE_*` environment variables. An unrecognised
// backend kind is rejected instead of silently falling back.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StoreError, StoreResult};

pub const ENV_DB_TYPE: &str = "TWINSTORE_DB_TYPE";
pub const ENV_DATA_DIR: &str = "TWINSTORE_DATA_DIR";
pub const ENV_REMOTE_URL: &str = "TWINSTORE_REMOTE_URL";
pub const ENV_REMOTE_DB: &str = "TWINSTORE_REMOTE_DB";
pub const ENV_REMOTE_API_KEY: &str = "TWINSTORE_REMOTE_API_KEY";
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "TWINSTORE_REMOTE_TIMEOUT_SECS";

/// Which backend the registry builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local file-per-collection store.
    #[default]
    Embedded,
    /// Remote document server.
    Networked,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" | "file" | "local" => Ok(BackendKind::Embedded),
            "networked" | "remote" | "server" => Ok(BackendKind::Networked),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown storage backend `{other}` (expected `embedded` or `networked`)"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Embedded => f.write_str("embedded"),
            BackendKind::Networked => f.write_str("networked"),
        }
    }
}

/// Settings for the embedded backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedConfig {
    /// Directory holding one `<collection>.db` file per collection.
    pub data_dir: PathBuf,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Settings for the networked backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkedConfig {
    /// Base URL of the document server.
    pub url: String,
    /// Database name sent with every request.
    pub database: String,
    /// Optional API key sent in the `api-key` header.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for NetworkedConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:27080".to_string(),
            database: "content_management".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Top-level storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub embedded: EmbeddedConfig,
    pub networked: NetworkedConfig,
}

impl StorageConfig {
    /// Embedded configuration rooted at `data_dir`.
    pub fn embedded(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Embedded,
            embedded: EmbeddedConfig {
                data_dir: data_dir.into(),
            },
            ..Self::default()
        }
    }

    /// Networked configuration pointing at `url`.
    pub fn networked(url: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Networked,
            networked: NetworkedConfig {
                url: url.into(),
                ..NetworkedConfig::default()
            },
            ..Self::default()
        }
    }

    /// Read configuration from `TWINSTORE_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StorageConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(kind) = value(ENV_DB_TYPE) {
            config.backend = kind.parse()?;
        }
        if let Some(dir) = value(ENV_DATA_DIR) {
            config.embedded.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = value(ENV_REMOTE_URL) {
            config.networked.url = url;
        }
        if let Some(database) = value(ENV_REMOTE_DB) {
            config.networked.database = database;
        }
        config.networked.api_key = value(ENV_REMOTE_API_KEY);
        if let Some(raw) = value(ENV_REMOTE_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.networked.timeout_secs = secs,
                _ => warn!(
                    value = %raw,
                    default = config.networked.timeout_secs,
                    "Ignoring invalid TWINSTORE_REMOTE_TIMEOUT_SECS"
                ),
            }
        }
        Ok(config)
    }
}
