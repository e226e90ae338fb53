//! File-backed configuration store.
//!
//! Implements [`ConfigPort`] over a TOML file.  Values are range-checked
//! on both load and save; see [`crate::config::validate_config`].

use std::path::{Path, PathBuf};

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::{self, SystemConfig};

pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored config, falling back to defaults when the file
    /// does not exist yet.  Other errors are returned.
    pub fn load_or_default(&self) -> Result<SystemConfig, ConfigError> {
        match self.load() {
            Err(ConfigError::NotFound) => {
                info!("No config at {}, using defaults", self.path.display());
                Ok(SystemConfig::default())
            }
            other => other,
        }
    }
}

impl ConfigPort for FileConfigStore {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        config::load_from_file(&self.path)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config::save_to_file(&self.path, config)?;
        info!("Config saved to {}", self.path.display());
        Ok(())
    }
}
