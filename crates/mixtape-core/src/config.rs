//! Application configuration management.
//!
//! Handles loading, saving, and managing application-wide settings: the
//! catalog API key, the staging directory for per-track downloads, and the
//! output directory for exported track lists and merged files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, FileSystemError, Result};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// API key for the playlist catalog. `None` until the user provides one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Directory where per-track downloads are staged before merging.
    #[serde(default = "default_staging_directory")]
    pub staging_dir: PathBuf,
    /// Directory where track lists and merged files are written.
    #[serde(default = "default_output_directory")]
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            staging_dir: default_staging_directory(),
            output_dir: default_output_directory(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, or create default if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        if !config_path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            // Ensure config directory exists and save defaults
            if let Err(e) = config.save() {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path).map_err(|e| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: config_path.clone(),
                reason: format!("Failed to read config file: {e}"),
            })
        })?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;

        info!("Loaded config from {}", config_path.display());
        debug!(
            "Staging: {}, output: {}",
            config.staging_dir.display(),
            config.output_dir.display()
        );

        Ok(config)
    }

    /// Save configuration to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        let config_path = config_file_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::FileSystem(FileSystemError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    reason: format!("Failed to create config directory: {e}"),
                })
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, content).map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: config_path.clone(),
                reason: format!("Failed to write config file: {e}"),
            })
        })?;

        info!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Create the staging and output directories, validating both.
    ///
    /// # Errors
    ///
    /// Returns an error if either directory is invalid or cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        validate_directory(&self.staging_dir)?;
        validate_directory(&self.output_dir)?;
        Ok(())
    }

    /// Get the configured API key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no key has been set.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::Configuration(
                "API key is not configured".to_string(),
            )),
        }
    }

    /// Update the output directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist or isn't writable.
    pub fn set_output_directory(&mut self, path: PathBuf) -> Result<()> {
        validate_directory(&path)?;

        self.output_dir = path;
        info!("Updated output directory to: {}", self.output_dir.display());
        Ok(())
    }

    /// Update the staging directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist or isn't writable.
    pub fn set_staging_directory(&mut self, path: PathBuf) -> Result<()> {
        validate_directory(&path)?;

        self.staging_dir = path;
        info!(
            "Updated staging directory to: {}",
            self.staging_dir.display()
        );
        Ok(())
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the default staging directory.
#[must_use]
pub fn default_staging_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mixtape")
        .join("staging")
}

/// Get the default output directory.
#[must_use]
pub fn default_output_directory() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mixtape")
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("mixtape")
        .join("config.json")
}

/// Validate that a directory is usable for staging or output files.
fn validate_directory(path: &Path) -> Result<()> {
    // Check if path is absolute
    if !path.is_absolute() {
        return Err(Error::Configuration(
            "Directory must be an absolute path".to_string(),
        ));
    }

    // If directory exists, check if it's actually a directory and writable
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "Path exists but is not a directory: {}",
                path.display()
            )));
        }

        // Try to check if we can write to it
        let test_file = path.join(".mixtape_write_test");
        match fs::write(&test_file, "test") {
            Ok(()) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "Directory is not writable: {} ({})",
                    path.display(),
                    e
                )));
            }
        }
    } else {
        // Try to create the directory
        fs::create_dir_all(path).map_err(|e| {
            Error::Configuration(format!("Cannot create directory {}: {}", path.display(), e))
        })?;
    }

    Ok(())
}
