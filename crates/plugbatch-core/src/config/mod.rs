//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::compatibility::HostEnvironment;
use crate::domain::lifecycle::ProcessorConfig;
use crate::domain::rollback::{MAX_RETENTION_HOURS, RollbackSettings};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "PLUGBATCH_CONFIG_DIR";

/// Plugbatch configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub processing: ProcessingConfig,
    pub rollback: RollbackConfig,
    pub paths: PathsConfig,
    pub host: HostConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub auto_activate: bool,
    pub auto_rollback: bool,
    pub network_wide: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    /// Record manifests and keep update backups for batch rollback
    pub enabled: bool,
    pub retention_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub plugins_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub database: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub runtime_version: String,
    pub host_version: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            auto_activate: false,
            auto_rollback: true,
            network_wide: false,
        }
    }
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_hours: RollbackSettings::default().retention_hours,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base = data_dir();
        Self {
            plugins_dir: base.join("plugins"),
            backup_dir: base.join("backups"),
            database: base.join("plugbatch.db"),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_version: "8.2.0".to_string(),
            host_version: "6.5.0".to_string(),
        }
    }
}

/// Base directory for plugbatch's own data
pub fn data_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("plugbatch"),
        None => PathBuf::from(".plugbatch"),
    }
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow!("Invalid value for {}: {} (expected true or false)", key, value)),
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("plugbatch")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or use defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        RollbackSettings::new(self.rollback.retention_hours).map_err(|e| anyhow!("{}", e))?;

        for (key, value) in [
            ("host.runtime_version", &self.host.runtime_version),
            ("host.host_version", &self.host.host_version),
        ] {
            if crate::domain::compatibility::parse_lenient(value).is_none() {
                return Err(anyhow!("{} is not a version: {}", key, value));
            }
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "processing.auto_activate" => Ok(self.processing.auto_activate.to_string()),
            "processing.auto_rollback" => Ok(self.processing.auto_rollback.to_string()),
            "processing.network_wide" => Ok(self.processing.network_wide.to_string()),

            "rollback.enabled" => Ok(self.rollback.enabled.to_string()),
            "rollback.retention_hours" => Ok(self.rollback.retention_hours.to_string()),

            "paths.plugins_dir" => Ok(self.paths.plugins_dir.display().to_string()),
            "paths.backup_dir" => Ok(self.paths.backup_dir.display().to_string()),
            "paths.database" => Ok(self.paths.database.display().to_string()),

            "host.runtime_version" => Ok(self.host.runtime_version.clone()),
            "host.host_version" => Ok(self.host.host_version.clone()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `plugbatch config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "processing.auto_activate" => {
                self.processing.auto_activate = parse_bool(key, value)?;
            }
            "processing.auto_rollback" => {
                self.processing.auto_rollback = parse_bool(key, value)?;
            }
            "processing.network_wide" => {
                self.processing.network_wide = parse_bool(key, value)?;
            }

            "rollback.enabled" => {
                self.rollback.enabled = parse_bool(key, value)?;
            }
            "rollback.retention_hours" => {
                let hours: u32 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid retention_hours value: {}", value))?;
                if !(1..=MAX_RETENTION_HOURS).contains(&hours) {
                    return Err(anyhow!(
                        "Retention must be between 1 and {} hours",
                        MAX_RETENTION_HOURS
                    ));
                }
                self.rollback.retention_hours = hours;
            }

            "paths.plugins_dir" | "paths.backup_dir" | "paths.database" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("{} must not be empty", key));
                }
                let path = PathBuf::from(value.trim());
                match key {
                    "paths.plugins_dir" => self.paths.plugins_dir = path,
                    "paths.backup_dir" => self.paths.backup_dir = path,
                    _ => self.paths.database = path,
                }
            }

            "host.runtime_version" | "host.host_version" => {
                if crate::domain::compatibility::parse_lenient(value).is_none() {
                    return Err(anyhow!("Invalid version for {}: {}", key, value));
                }
                if key == "host.runtime_version" {
                    self.host.runtime_version = value.trim().to_string();
                } else {
                    self.host.host_version = value.trim().to_string();
                }
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `plugbatch config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "processing.auto_activate",
            "processing.auto_rollback",
            "processing.network_wide",
            "rollback.enabled",
            "rollback.retention_hours",
            "paths.plugins_dir",
            "paths.backup_dir",
            "paths.database",
            "host.runtime_version",
            "host.host_version",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }

    /// Processor settings for a batch run by `actor_id`
    pub fn processor_config(&self, actor_id: impl Into<String>) -> ProcessorConfig {
        ProcessorConfig {
            auto_activate: self.processing.auto_activate,
            auto_rollback: self.processing.auto_rollback,
            retain_backups: self.rollback.enabled,
            network_wide: self.processing.network_wide,
            actor_id: actor_id.into(),
        }
    }

    pub fn rollback_settings(&self) -> anyhow::Result<RollbackSettings> {
        RollbackSettings::new(self.rollback.retention_hours).map_err(|e| anyhow!("{}", e))
    }

    pub fn host_environment(&self) -> HostEnvironment {
        HostEnvironment {
            runtime_version: self.host.runtime_version.clone(),
            host_version: self.host.host_version.clone(),
        }
    }
}
