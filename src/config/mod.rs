// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the rust-ephys command line tool
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! - `loader`: channel selection and buffer sizes of streamed recordings
//! - `spectral`: frequency resolutions and Welch parameters
//!
//! ## Layered configuration
//!
//! [`Config::load_files`] reads a configuration file of a given name from
//! the working directory and from the directories above a recording, so
//! that settings can be shared by all recordings of a data tree and refined
//! per directory.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_ephys::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("ephys.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(Some(0), Some(vec![1.0, 4.0]), None, None);
//!
//! println!("Resolutions: {:?}", config.spectral.freq_resolutions);
//! ```

pub mod loader;
pub mod spectral;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

pub use loader::LoaderConfig;
pub use spectral::SpectralConfig;
pub use utils::{merge_values, output_config_schema};

/// Default name of layered configuration files
pub const DEFAULT_CONFIG_NAME: &str = "ephys.yaml";

/// Default number of directory levels searched by [`Config::load_files`]
pub const DEFAULT_MAX_LEVEL: usize = 3;

/// Root configuration structure.
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, allowing for minimal configuration files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Loading and streaming of recordings.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Power spectrum estimation.
    #[serde(default)]
    pub spectral: SpectralConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        // Create parent directories if they don't exist
        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Parse a YAML configuration file into a generic value
    fn read_value(path: &Path) -> Result<serde_yml::Value> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;
        serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))
    }

    /// Validate, deserialize and check a configuration value.
    ///
    /// On failure a sample file with default values is written next to
    /// `path`.
    fn from_value(value: serde_yml::Value, path: &Path) -> Result<Self> {
        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = utils::validate_against_schema(&value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        let config: Config = match serde_yml::from_value(value) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Load configuration from a file, writing the defaults if it is missing
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let mut value = serde_yml::to_value(Self::default())
            .context("Failed to serialize default configuration")?;
        let file_value = Self::read_value(path)?;
        // an empty file keeps the defaults
        if !file_value.is_null() {
            check_top_level(&file_value, path)?;
            value = file_value;
        }
        Self::from_value(value, path)
    }

    /// Directories searched by [`Config::load_files`] for `data_path`, the
    /// farthest first.
    ///
    /// The directory of the recording counts as the first level.
    pub fn search_dirs<P: AsRef<Path>>(data_path: P, max_level: usize) -> Result<Vec<PathBuf>> {
        let data_path = data_path.as_ref();
        let absolute = if data_path.is_absolute() {
            data_path.to_path_buf()
        } else {
            std::env::current_dir()
                .context("Failed to get the working directory")?
                .join(data_path)
        };
        let dir = if absolute.is_dir() {
            absolute
        } else {
            absolute
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/"))
        };
        let mut dirs: Vec<PathBuf> = dir.ancestors().take(max_level).map(Path::to_path_buf).collect();
        dirs.reverse();
        Ok(dirs)
    }

    /// Load layered configuration for a recording.
    ///
    /// Starting from the defaults, `name` is read from the working
    /// directory and then from up to `max_level` directories containing
    /// `data_path`, from the farthest to the nearest. Later files override
    /// the values of earlier ones key by key. Returns the configuration and
    /// the files that were read.
    pub fn load_files<P: AsRef<Path>>(
        name: &str,
        data_path: P,
        max_level: usize,
    ) -> Result<(Self, Vec<PathBuf>)> {
        let mut candidates = vec![PathBuf::from(name)];
        candidates.extend(
            Self::search_dirs(data_path, max_level)?
                .into_iter()
                .map(|dir| dir.join(name)),
        );

        let mut value = serde_yml::to_value(Self::default())
            .context("Failed to serialize default configuration")?;
        let mut loaded = Vec::new();
        for path in candidates {
            if !path.is_file() || loaded.contains(&path) {
                continue;
            }
            info!("Loading configuration {}", path.display());
            let file_value = Self::read_value(&path)?;
            if !file_value.is_null() {
                check_top_level(&file_value, &path)?;
                merge_values(&mut value, file_value);
            }
            loaded.push(path);
        }

        let reference = loaded
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name));
        let config = Self::from_value(value, &reference)?;
        Ok((config, loaded))
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the existing
    /// configuration.
    ///
    /// # Parameters
    ///
    /// * `channel` - Channel to load, negative for all channels
    /// * `freq_resolutions` - Frequency resolutions in Hz
    /// * `buffer_seconds` - Window size of buffered streams
    /// * `back_seconds` - Look-back of buffered streams
    pub fn apply_args(
        &mut self,
        channel: Option<i64>,
        freq_resolutions: Option<Vec<f64>>,
        buffer_seconds: Option<f64>,
        back_seconds: Option<f64>,
    ) {
        if let Some(channel) = channel {
            debug!("Overriding channel from command line: {}", channel);
            self.loader.channel = channel;
        }
        if let Some(resolutions) = freq_resolutions {
            debug!(
                "Overriding frequency resolutions from command line: {:?}",
                resolutions
            );
            self.spectral.freq_resolutions = resolutions;
        }
        if let Some(seconds) = buffer_seconds {
            debug!("Overriding buffer size from command line: {} s", seconds);
            self.loader.buffer_seconds = seconds;
        }
        if let Some(seconds) = back_seconds {
            debug!("Overriding back buffer size from command line: {} s", seconds);
            self.loader.back_seconds = seconds;
        }
    }
}

fn check_top_level(value: &serde_yml::Value, path: &Path) -> Result<()> {
    if !value.is_mapping() {
        anyhow::bail!(
            "Configuration file {} does not contain a mapping",
            path.display()
        );
    }
    Ok(())
}
