//! TOML-based engine configuration.
//!
//! Stores:
//! - The reference UTC offset that defines calendar-day boundaries
//! - Database location and busy timeout
//! - Badge rule file location
//! - Default log level
//!
//! Configuration is stored at `~/.config/ritual/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::badges::BadgeRuleTable;
use crate::clock::DayBoundary;
use crate::error::ConfigError;

/// Calendar-day configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Fixed offset such as `+00:00` or `+09:00`; never the host zone.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; defaults to `ritual.db` in the data directory.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Badge rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BadgesConfig {
    /// TOML file of `[[badges]]`; the built-in table is used when unset.
    #[serde(default)]
    pub rules_path: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/ritual/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub badges: BadgesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_utc_offset() -> String {
    "+00:00".into()
}
fn default_busy_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
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
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".into(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // Unset optional values are stored as strings.
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default config file location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            return Ok(cfg);
        }
        Self::load_from(&path)
    }

    /// Load from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        cfg.day_boundary()?;
        Ok(cfg)
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

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

    /// Set a config value by dot-separated key. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// into the field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.day_boundary()?;
        *self = updated;
        Ok(())
    }

    /// Day boundary parsed from `calendar.utc_offset`.
    pub fn day_boundary(&self) -> Result<DayBoundary, ConfigError> {
        DayBoundary::parse(&self.calendar.utc_offset).ok_or_else(|| ConfigError::InvalidValue {
            key: "calendar.utc_offset".into(),
            message: format!("expected +HH:MM or -HH:MM, got '{}'", self.calendar.utc_offset),
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.busy_timeout_ms)
    }

    /// Database file, resolved against the data directory when unset.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(data_dir()?.join("ritual.db")),
        }
    }

    /// Load the badge rule table this config points at.
    pub fn load_badge_rules(&self) -> Result<BadgeRuleTable, ConfigError> {
        match &self.badges.rules_path {
            Some(path) => BadgeRuleTable::load(Path::new(path)),
            None => Ok(BadgeRuleTable::builtin()),
        }
    }

    /// Load from disk, returning default on error.
    /// Never writes; a missing file yields the defaults.
    pub fn load_or_default() -> Self {
        Self::path()
            .map(|path| Self::load_or_default_from(&path))
            .unwrap_or_default()
    }

    /// Read `path` if it holds a valid config, otherwise the defaults.
    pub fn load_or_default_from(path: &Path) -> Self {
        Self::load_from(path).unwrap_or_default()
    }
}
