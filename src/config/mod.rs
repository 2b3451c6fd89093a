//! Configuration Module
//!
//! Handles configuration loading, validation, and saving.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Context store database
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Conversation context lifetime and history bounds
    #[serde(default)]
    pub context: ContextConfig,

    /// Flow-lock rollout switches
    #[serde(default)]
    pub rollout: RolloutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flowlock")
        .join("flowlock.db")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log to file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Idle lifetime of a conversation context, extended on every message
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,

    #[serde(default = "default_history_limit")]
    pub intent_history_limit: usize,

    #[serde(default = "default_history_limit")]
    pub flow_history_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            intent_history_limit: default_history_limit(),
            flow_history_limit: default_history_limit(),
        }
    }
}

fn default_ttl_minutes() -> i64 {
    120
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Global switch for the flow-lock path
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Serve only a hashed percentage of sessions
    #[serde(default)]
    pub gradual_rollout: bool,

    /// Share of sessions served when `gradual_rollout` is on (0-100)
    #[serde(default = "default_rollout_percentage")]
    pub rollout_percentage: u8,

    /// Tenants that never get the flow-lock path
    #[serde(default)]
    pub blacklist: Vec<String>,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gradual_rollout: false,
            rollout_percentage: default_rollout_percentage(),
            blacklist: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rollout_percentage() -> u8 {
    10
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. Default values
    /// 2. System config: ~/.config/flowlock/config.toml
    /// 3. Local config: ./flowlock.toml
    /// 4. Environment variables
    pub fn load() -> Result<Self> {
        tracing::debug!("Loading configuration...");

        let mut config = Self::default();

        if let Some(system_config_path) = Self::system_config_path()
            && system_config_path.exists()
        {
            tracing::debug!("Loading system config from: {:?}", system_config_path);
            config = Self::merge_from_file(&system_config_path)?;
        }

        let local_config_path = Self::local_config_path();
        if local_config_path.exists() {
            tracing::debug!("Loading local config from: {:?}", local_config_path);
            config = Self::merge_from_file(&local_config_path)?;
        }

        config = Self::apply_env_overrides(config, |key| std::env::var(key).ok())?;

        tracing::debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from a specific file, then apply environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading configuration from custom path: {:?}", path);

        if !path.exists() {
            anyhow::bail!("Config file not found: {:?}", path);
        }
        let config = Self::merge_from_file(path)?;
        Self::apply_env_overrides(config, |key| std::env::var(key).ok())
    }

    fn system_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flowlock").join("config.toml"))
    }

    fn local_config_path() -> PathBuf {
        PathBuf::from("./flowlock.toml")
    }

    /// Parse a TOML file; sections it omits take their defaults
    fn merge_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_env_overrides<F>(mut config: Self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup("FLOWLOCK_DB_PATH") {
            config.database.path = PathBuf::from(db_path);
        }
        if let Some(log_level) = lookup("FLOWLOCK_LOG_LEVEL") {
            config.logging.level = log_level;
        }
        if let Some(log_file) = lookup("FLOWLOCK_LOG_FILE") {
            config.logging.file = Some(PathBuf::from(log_file));
        }
        if let Some(ttl) = lookup("FLOWLOCK_CONTEXT_TTL_MINUTES") {
            config.context.ttl_minutes = ttl
                .trim()
                .parse()
                .with_context(|| format!("Invalid FLOWLOCK_CONTEXT_TTL_MINUTES: {}", ttl))?;
        }

        if let Some(enabled) = lookup("ENABLE_FLOW_LOCK") {
            config.rollout.enabled = enabled.trim() == "true";
        }
        if let Some(gradual) = lookup("GRADUAL_ROLLOUT") {
            config.rollout.gradual_rollout = gradual.trim() == "true";
        }
        if let Some(percentage) = lookup("ROLLOUT_PERCENTAGE") {
            config.rollout.rollout_percentage = percentage
                .trim()
                .parse()
                .with_context(|| format!("Invalid ROLLOUT_PERCENTAGE: {}", percentage))?;
        }
        if let Some(blacklist) = lookup("FLOW_LOCK_BLACKLIST") {
            config.rollout.blacklist = blacklist
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        tracing::debug!("Validating configuration...");

        if let Some(parent) = self.database.path.parent()
            && !parent.exists()
        {
            tracing::warn!(
                "Database parent directory does not exist, will be created: {:?}",
                parent
            );
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        if self.rollout.rollout_percentage > 100 {
            anyhow::bail!(
                "Invalid rollout percentage: {} (must be 0-100)",
                self.rollout.rollout_percentage
            );
        }

        if self.context.ttl_minutes <= 0 {
            anyhow::bail!("Context TTL must be positive, got {}", self.context.ttl_minutes);
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Configuration saved to: {:?}", path);
        Ok(())
    }
}
