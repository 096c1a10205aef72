//! Configuration file support for rplan.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/rplan/config.toml`.

use crate::assembler::{GenerationOptions, DEFAULT_CANCEL_CHECK_INTERVAL};
use crate::calendar::ActiveDays;
use crate::recreate::{RecreateOptions, DEFAULT_MAX_PROJECTION_RATIO};
use crate::types::ScheduleType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub schedule: ScheduleDefaults,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub recreate: RecreateConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// External catalog location; the built-in catalog is used when unset
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Defaults for new schedules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleDefaults {
    #[serde(default = "default_years")]
    pub years: f64,

    #[serde(default = "default_schedule_type")]
    pub schedule_type: ScheduleType,

    #[serde(default)]
    pub active_days: ActiveDays,
}

impl Default for ScheduleDefaults {
    fn default() -> Self {
        Self {
            years: default_years(),
            schedule_type: default_schedule_type(),
            active_days: ActiveDays::ALL,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Virtual days between cooperative cancellation checks
    #[serde(default = "default_cancel_check_interval")]
    pub cancel_check_interval: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            cancel_check_interval: default_cancel_check_interval(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecreateConfig {
    /// Largest accepted ratio between a projected span and its source span
    #[serde(default = "default_max_projection_ratio")]
    pub max_projection_ratio: f64,
}

impl Default for RecreateConfig {
    fn default() -> Self {
        Self {
            max_projection_ratio: default_max_projection_ratio(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rplan")
}

fn default_years() -> f64 {
    1.0
}

fn default_schedule_type() -> ScheduleType {
    ScheduleType::Sequential
}

fn default_cancel_check_interval() -> usize {
    DEFAULT_CANCEL_CHECK_INTERVAL
}

fn default_max_projection_ratio() -> f64 {
    DEFAULT_MAX_PROJECTION_RATIO
}

impl Config {
    /// Load configuration from the default location
    ///
    /// Falls back to default values if the config file doesn't exist.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values the generator cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.schedule.years.is_finite() || self.schedule.years <= 0.0 {
            return Err(Error::Config(format!(
                "schedule.years must be positive, got {}",
                self.schedule.years
            )));
        }
        if self.schedule.schedule_type == ScheduleType::Custom {
            return Err(Error::Config(
                "schedule.schedule_type cannot be custom".to_string(),
            ));
        }
        if self.schedule.active_days.none_active() {
            return Err(Error::Config(
                "schedule.active_days selects no weekday".to_string(),
            ));
        }
        if !self.recreate.max_projection_ratio.is_finite()
            || self.recreate.max_projection_ratio <= 0.0
        {
            return Err(Error::Config(format!(
                "recreate.max_projection_ratio must be positive, got {}",
                self.recreate.max_projection_ratio
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let base = match dirs::config_dir() {
            Some(dir) => dir,
            None => {
                let home = std::env::var("HOME").map_err(|_| {
                    Error::Config("HOME environment variable not set".to_string())
                })?;
                PathBuf::from(home).join(".config")
            }
        };
        Ok(base.join("rplan").join("config.toml"))
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            cancel_check_interval: self.generation.cancel_check_interval,
        }
    }

    pub fn recreate_options(&self) -> RecreateOptions {
        RecreateOptions {
            generation: self.generation_options(),
            max_projection_ratio: self.recreate.max_projection_ratio,
        }
    }
}
