//! Configuration management for the hhsim CLI

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

/// Global CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Default logging level
    pub log_level: Option<String>,

    /// Default number of parallel sweep jobs (all cores when unset)
    pub default_jobs: Option<usize>,

    /// User preferences
    pub preferences: UserPreferences,
}

/// Output and display preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Show progress bars
    pub show_progress: bool,

    /// Default output format
    pub output_format: OutputFormat,

    /// Spike detection threshold (mV)
    pub spike_threshold_mv: f64,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            show_progress: true,
            output_format: OutputFormat::Csv,
            spike_threshold_mv: hhsim_core::DEFAULT_SPIKE_THRESHOLD_MV,
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            default_jobs: None,
            preferences: UserPreferences::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> CliResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| CliError::config(format!("Invalid config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> CliResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CliError::config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> CliResult<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| CliError::config("Could not determine config directory"))?;
        Ok(config_dir.join("hhsim").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`
    pub fn resolve(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(p) if !p.exists() => Err(CliError::missing_resource(format!(
                "config file {} not found",
                p.display()
            ))),
            Some(p) => Self::load_from_file(p),
            None => Self::load_from_file(&Self::default_config_path()?),
        }
    }
}
