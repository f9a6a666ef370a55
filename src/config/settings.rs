//! Configuration settings for tapline.
//!
//! Settings are loaded from `~/.tapline/config.yaml`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Paths;
use crate::error::TaplineError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Sync and retry settings.
    pub sync: SyncConfig,
    /// Storage maintenance settings.
    pub storage: StorageConfig,
}

/// Sync and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base retry delay in seconds.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    /// Maximum retry delay in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Transient failures tolerated before an item is surfaced as terminal.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Maximum number of items submitted in one batch.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

/// Storage maintenance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Age in hours after which terminal items may be purged.
    #[serde(default = "default_purge_after_hours")]
    pub purge_after_hours: i64,
}

// Default value functions for serde
const fn default_base_delay_secs() -> u64 {
    1
}

const fn default_max_delay_secs() -> u64 {
    60
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_batch_limit() -> usize {
    50
}

const fn default_purge_after_hours() -> i64 {
    72
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            max_retries: default_max_retries(),
            batch_limit: default_batch_limit(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            purge_after_hours: default_purge_after_hours(),
        }
    }
}

impl SyncConfig {
    /// Base retry delay as a `Duration`.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    /// Maximum retry delay as a `Duration`.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, TaplineError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, TaplineError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            TaplineError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            TaplineError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<(), TaplineError> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        self.save_to_path(&paths.config_file)
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), TaplineError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| TaplineError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            TaplineError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}
