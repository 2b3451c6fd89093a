//! Logging setup
//!
//! Console logging by default; in debug mode logs go to a daily-rotated file
//! through a non-blocking writer instead. The returned guard must be held
//! for the lifetime of the process so buffered lines are flushed.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "flowlock";
const LOG_FILE_SUFFIX: &str = "log";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub debug_mode: bool,
    pub log_dir: PathBuf,
    pub level: String,
    pub json: bool,
    /// Rotated files are named `<prefix>.<date>.<suffix>`
    pub file_prefix: String,
    pub file_suffix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            log_dir: default_log_dir(),
            level: "info".to_string(),
            json: false,
            file_prefix: LOG_FILE_PREFIX.to_string(),
            file_suffix: LOG_FILE_SUFFIX.to_string(),
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive from the `[logging]` config section. A configured log file
    /// turns on file logging: `/var/log/app/chat.log` rotates into
    /// `/var/log/app/chat.<date>.log`.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut log_config = Self::new().with_level(config.level.clone());
        let Some(file) = config.file.as_deref() else {
            return log_config;
        };

        log_config = log_config.with_debug_mode(true);
        if let Some(dir) = file.parent()
            && !dir.as_os_str().is_empty()
        {
            log_config = log_config.with_log_dir(dir.to_path_buf());
        }
        if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
            let suffix = file
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or(LOG_FILE_SUFFIX);
            log_config = log_config.with_file_name(stem, suffix);
        }
        log_config
    }

    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }

    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_file_name(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self.file_suffix = suffix.into();
        self
    }

    fn is_log_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                name.starts_with(&self.file_prefix) && name.ends_with(&self.file_suffix)
            })
    }

    /// `RUST_LOG` wins over the configured level; debug mode forces at least debug
    fn filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let level = if self.debug_mode && !matches!(self.level.as_str(), "trace" | "debug") {
            "debug"
        } else {
            self.level.as_str()
        };
        EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level))
    }
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flowlock")
        .join("logs")
}

/// Install the global subscriber. Returns the file writer guard in debug mode.
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.filter()?;

    if !config.debug_mode {
        let registry = tracing_subscriber::registry().with(filter);
        if config.json {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
                .try_init()?;
        } else {
            registry
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .try_init()?;
        }
        return Ok(None);
    }

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", config.log_dir))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix(&config.file_suffix)
        .build(&config.log_dir)
        .context("Failed to create log file appender")?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    tracing::info!("Logging to {}", config.log_dir.display());
    Ok(Some(guard))
}

/// Most recently modified log file in the configured log directory
pub fn get_log_path(config: &LogConfig) -> Option<PathBuf> {
    std::fs::read_dir(&config.log_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| config.is_log_file(path))
        .max_by_key(|path| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
}

/// Delete log files last modified more than `days` days ago
pub fn cleanup_old_logs(config: &LogConfig, days: u64) -> Result<usize> {
    let dir = config.log_dir.as_path();
    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(days * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read log directory: {:?}", dir))?
    {
        let path = entry?.path();
        if !config.is_log_file(&path) {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        if modified < cutoff {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove log file: {:?}", path))?;
            removed += 1;
        }
    }
    Ok(removed)
}
