//! TOML-based application configuration.
//!
//! Stores engine preferences including:
//! - Poll cadence, fetch timeout and overlap handling
//! - How habit identity is derived and whether stale progress is evicted
//! - Notification switch, alert title and channel settings
//!
//! Configuration is stored at `~/.config/habitpulse/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::habit::IdentityMode;
use crate::reminder::{
    Cadence, CoordinatorOptions, DriverOptions, OverlapPolicy, Permission,
};
use crate::reminder::dispatch::DEFAULT_ALERT_TITLE;

/// Poll driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub cadence: Cadence,
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Skip boundaries already crossed when the driver starts.
    #[serde(default = "default_true")]
    pub prime_on_start: bool,
}

/// Progress store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default)]
    pub identity: IdentityMode,
    #[serde(default = "default_true")]
    pub evict_stale: bool,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_title")]
    pub title: String,
    /// Permission reported by the console channel.
    #[serde(default = "default_permission")]
    pub permission: Permission,
    /// External command used instead of the console, e.g.
    /// `["notify-send"]`. Title and body are appended as arguments.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/habitpulse/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_interval_secs() -> u64 {
    60
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_title() -> String {
    DEFAULT_ALERT_TITLE.into()
}
fn default_permission() -> Permission {
    Permission::Granted
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            cadence: Cadence::default(),
            overlap: OverlapPolicy::default(),
            prime_on_start: true,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            identity: IdentityMode::default(),
            evict_stale: true,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: default_title(),
            permission: default_permission(),
            command: None,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // Unset optionals take JSON when it parses, a plain string otherwise.
                    serde_json::Value::Null => serde_json::from_str(value)
                        .unwrap_or_else(|_| serde_json::Value::String(value.into())),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    /// Path of the config file.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::DirUnavailable(e.to_string()))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be parsed or the defaults cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// # Errors
    /// Returns an error if the config cannot be serialized or written to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory by dot-separated key, validating the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config is invalid.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and persist. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll.interval_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.poll.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll.fetch_timeout_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        // One tick must be one minute for counting to mean minutes.
        if self.poll.cadence == Cadence::TickCount && self.poll.interval_secs != 60 {
            return Err(ConfigError::InvalidValue {
                key: "poll.cadence".into(),
                message: format!(
                    "tick_count requires poll.interval_secs = 60, got {}",
                    self.poll.interval_secs
                ),
            });
        }
        if self
            .notifications
            .command
            .as_ref()
            .is_some_and(|argv| argv.is_empty() || argv[0].trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                key: "notifications.command".into(),
                message: "command must name a program".into(),
            });
        }
        Ok(())
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            cadence: self.poll.cadence,
            overlap: self.poll.overlap,
            identity: self.progress.identity,
            fetch_timeout: Duration::from_secs(self.poll.fetch_timeout_secs),
            evict_stale: self.progress.evict_stale,
        }
    }

    pub fn driver_options(&self, max_ticks: Option<u64>) -> DriverOptions {
        DriverOptions {
            interval: Duration::from_secs(self.poll.interval_secs),
            max_ticks,
            prime_on_start: self.poll.prime_on_start,
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
