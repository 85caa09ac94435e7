//! Configuration management for feedlens.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (FEEDLENS_*)
//! 2. Config file (FEEDLENS_CONFIG, else `<data_dir>/config.toml`)
//! 3. Default values

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Generation service settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Paths
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Chat-completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for feedlens data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// State database (defaults to `<data_dir>/state.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_api_url() -> String {
    feedlens_core::client::DEFAULT_API_URL.to_string()
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "feedlens", "feedlens") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".feedlens")
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load a config file, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content)
            .map_err(CliError::from)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// Apply FEEDLENS_* overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("FEEDLENS_DATABASE_PATH").filter(|p| !p.is_empty()) {
            self.paths.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("FEEDLENS_API_URL").filter(|u| !u.is_empty()) {
            self.service.api_url = url;
        }
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FEEDLENS_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Resolved state database path.
    pub fn database_path(&self) -> PathBuf {
        self.paths
            .database_path
            .clone()
            .unwrap_or_else(|| self.paths.data_dir.join("state.db"))
    }
}
