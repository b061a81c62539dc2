// Configuration file model
// Stored as RON, like the rest of the persisted state

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location inside the user's config directory
const CONFIG_DIR_NAME: &str = "lampctl";
const CONFIG_FILE_NAME: &str = "config.ron";

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_filter: Option<String>,
    pub sequencer: SequencerConfig,
    /// In-memory providers to register at startup
    pub providers: Vec<ProviderConfig>,
}

/// Playback worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Capacity of the notification ring buffer
    pub notification_capacity: usize,
    /// Dispatches later than this are logged as warnings
    pub lateness_warning_ms: u64,
}

impl SequencerConfig {
    pub fn lateness_warning(&self) -> Duration {
        Duration::from_millis(self.lateness_warning_ms)
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            notification_capacity: 256,
            lateness_warning_ms: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub lamps: Vec<LampConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LampConfig {
    pub id: String,
    pub name: String,
}

impl Config {
    /// Parse a configuration document
    pub fn from_ron_str(data: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = ron::from_str(data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&data, path)
    }

    /// Load from `path` if given, else from the default location if a file
    /// exists there, else fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_config_path() {
            Some(default_path) if default_path.exists() => Self::load(&default_path),
            _ => Ok(Self::default()),
        }
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequencer.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "sequencer.notification_capacity must be > 0".to_string(),
            ));
        }

        let mut ids = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(ConfigError::Invalid("provider id cannot be empty".to_string()));
            }
            if !ids.insert(provider.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider id: {}",
                    provider.id
                )));
            }
        }

        Ok(())
    }
}

/// `<config dir>/lampctl/config.ron`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
