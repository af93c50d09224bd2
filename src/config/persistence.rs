// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration persistence (save/load).

use crate::config::EngineConfig;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to determine config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Manages configuration file persistence.
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for the platform config directory.
    pub fn new() -> Result<Self, ConfigError> {
        let project_dirs =
            ProjectDirs::from("", "", "audioloop").ok_or(ConfigError::NoConfigDir)?;
        Self::with_dir(project_dirs.config_dir())
    }

    /// Create a config manager rooted at `config_dir`, creating it if needed.
    pub fn with_dir(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref().to_path_buf();
        fs::create_dir_all(&config_dir)?;
        debug!("Config directory: {:?}", config_dir);
        Ok(Self { config_dir })
    }

    /// Get the path to the engine config file.
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("engine.toml")
    }

    /// Load the engine config, falling back to defaults if none is saved.
    pub fn load_config(&self) -> Result<EngineConfig, ConfigError> {
        let path = self.config_path();
        if !path.exists() {
            debug!("No engine config found, using defaults");
            return Ok(EngineConfig::default());
        }

        let content = fs::read_to_string(&path)?;
        let config = EngineConfig::from_toml(&content)?;
        info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Save the engine config.
    pub fn save_config(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        let path = self.config_path();
        fs::write(&path, config.to_toml()?)?;
        debug!("Saved engine config to {:?}", path);
        Ok(())
    }
}
