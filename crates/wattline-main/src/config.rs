// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Wattline.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wattline_types::{DeviceConfig, GeneralConfig, StorageConfig};

pub const CONFIG_ENV: &str = "WATTLINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub storage: StorageConfig,
    pub system: SystemConfig,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
    /// Upper bound for one asynchronous component read
    pub async_timeout_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            async_timeout_secs: 10,
        }
    }
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Nothing at this path; built-in defaults are in use
    Defaults(PathBuf),
}

impl AppConfig {
    pub fn async_timeout(&self) -> Duration {
        Duration::from_secs(self.system.async_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.control_interval == 0 {
            anyhow::bail!("general.control_interval must be at least 1 second");
        }
        if self.system.async_timeout_secs == 0 {
            anyhow::bail!("system.async_timeout_secs must be at least 1 second");
        }
        let bands = &self.general.grid_protection;
        if bands.max_stagger_secs == 0 {
            anyhow::bail!("general.grid_protection.max_stagger_secs must be at least 1");
        }

        let mut ids = HashSet::new();
        for device in &self.devices {
            if !ids.insert(device.id) {
                anyhow::bail!("Device id {} is used more than once", device.id);
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration file path: `$WATTLINE_CONFIG`, else `./config.toml`
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load from `path`, falling back to defaults when the file does not exist.
/// A file that exists but does not parse is an error.
pub fn load_config_from(path: &Path) -> Result<(AppConfig, ConfigSource)> {
    if !path.exists() {
        return Ok((AppConfig::default(), ConfigSource::Defaults(path.to_path_buf())));
    }
    let config = AppConfig::from_file(path)?;
    Ok((config, ConfigSource::File(path.to_path_buf())))
}

pub fn load_config_with_fallback() -> Result<(AppConfig, ConfigSource)> {
    load_config_from(&config_path())
}
