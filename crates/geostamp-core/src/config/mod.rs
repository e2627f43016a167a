//! Configuration management for geostamp.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default` and missing keys fall back to
//! it.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pipeline settings
    pub pipeline: PipelineConfig,

    /// Reverse geocoder settings
    pub geocoder: GeocoderConfig,

    /// Caption overlay settings
    pub annotation: AnnotationConfig,

    /// Capture-side settings
    pub capture: CaptureConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.geostamp.geostamp/config.toml
    /// - Linux: ~/.config/geostamp/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\geostamp\config\config.toml
    ///
    /// Falls back to ~/.geostamp/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "geostamp", "geostamp")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".geostamp").join("config.toml")
            })
    }

    /// Get the resolved session directory (with ~ expansion).
    pub fn session_dir(&self) -> PathBuf {
        expand(&self.pipeline.session_dir)
    }

    /// Get the resolved caption font path (with ~ expansion), if configured.
    pub fn font_path(&self) -> Option<PathBuf> {
        self.annotation.font_path.as_deref().map(expand)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}
