mod defaults;

#[cfg(test)]
mod tests;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TaskflowError;
use defaults::*;

/// Top-level TaskFlow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub taskflow: TaskflowConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub timezone: TimezoneConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskflowConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TaskflowConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl TaskflowConfig {
    /// Directory for the rolling log file.
    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.data_dir)).join("logs")
    }
}

/// Memory store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_path")]
    pub path: String,
    #[serde(default = "default_max_history")]
    pub max_conversation_history: usize,
    #[serde(default = "default_retention_days")]
    pub backup_retention_days: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
            max_conversation_history: default_max_history(),
            backup_retention_days: default_retention_days(),
        }
    }
}

impl MemoryConfig {
    /// Store file path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.path))
    }
}

/// Scheduler configuration -- reminder delivery loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Per-user request throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Timezone fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimezoneConfig {
    /// IANA zone used when neither country nor city resolves.
    #[serde(default = "default_zone")]
    pub default_zone: String,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            default_zone: default_zone(),
        }
    }
}

impl TimezoneConfig {
    /// Parsed default zone. Only fails on a config that skipped [`Config::validate`].
    pub fn zone(&self) -> Result<Tz, TaskflowError> {
        self.default_zone.parse::<Tz>().map_err(|_| {
            TaskflowError::Config(format!("unknown timezone: {}", self.default_zone))
        })
    }
}

impl Config {
    /// Reject values that would make the store or scheduler misbehave.
    pub fn validate(&self) -> Result<(), TaskflowError> {
        self.timezone.zone()?;
        if self.scheduler.poll_interval_secs == 0 {
            return Err(TaskflowError::Config(
                "scheduler.poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(TaskflowError::Config(
                "rate_limit.max_requests and rate_limit.window_secs must be greater than 0".into(),
            ));
        }
        if self.memory.max_conversation_history == 0 {
            return Err(TaskflowError::Config(
                "memory.max_conversation_history must be greater than 0".into(),
            ));
        }
        if self.memory.path.trim().is_empty() {
            return Err(TaskflowError::Config("memory.path must not be empty".into()));
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. The result is validated
/// either way.
pub fn load(path: &str) -> Result<Config, TaskflowError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| TaskflowError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| TaskflowError::Config(format!("failed to parse config: {}", e)))?;

    config.validate()?;
    Ok(config)
}
