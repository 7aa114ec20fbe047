//! Configuration loading.
//!
//! Settings live in a TOML file at `~/.doppel/config.toml`:
//!
//! ```toml
//! [app]
//! model = "gemini-2.5-flash-image"
//!
//! [api_keys]
//! google = "..."
//!
//! [wizard]
//! starting_coins = 20
//! recompose_cost = 10
//! ```
//!
//! `DOPPEL_CONFIG` overrides the file location; `GEMINI_API_KEY` overrides
//! the configured key. A missing file yields the defaults - only a file
//! that exists but cannot be read or parsed is an error.

use std::io;
use std::path::{Path, PathBuf};
use std::{env, fmt, fs};

use doppel_types::{RECOMPOSE_COST, STARTING_COINS};
use serde::Deserialize;

pub const CONFIG_ENV: &str = "DOPPEL_CONFIG";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DoppelConfig {
    pub app: AppConfig,
    pub api_keys: ApiKeys,
    pub wizard: WizardConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model override; the gateway default applies when unset.
    pub model: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub google: Option<String>,
}

// Keys never land in logs, even at debug level.
impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("google", &self.google.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    pub starting_coins: u32,
    pub recompose_cost: u32,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            starting_coins: STARTING_COINS,
            recompose_cost: RECOMPOSE_COST,
        }
    }
}

impl DoppelConfig {
    /// The effective config path: `DOPPEL_CONFIG` when set, otherwise
    /// `~/.doppel/config.toml`.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|home| home.join(".doppel").join("config.toml"))
    }

    /// Load the effective config, falling back to defaults when no file
    /// exists.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::path() {
            Some(path) if path.exists() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The Google API key, preferring the `GEMINI_API_KEY` environment
    /// variable over the config file.
    #[must_use]
    pub fn google_api_key(&self) -> Option<String> {
        env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_keys.google.clone())
    }
}
