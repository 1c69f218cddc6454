//! TOML-based application configuration.
//!
//! Stores the knobs the core consumes but does not own:
//! - Working-hours window for the room
//! - Booking horizon and the offered duration set
//! - Reminder enablement, lookahead, and scheduler tick
//!
//! Configuration is stored at `data_dir()/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ValidationError;
use crate::slots::WorkingHours;

/// Working-hours window, as "HH:MM" strings in the room's local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoursConfig {
    #[serde(default = "default_hours_start")]
    pub start: String,
    #[serde(default = "default_hours_end")]
    pub end: String,
}

/// Reminder delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How far ahead of a slot's start a reminder fires, in minutes.
    #[serde(default = "default_lookahead_min")]
    pub lookahead_min: u32,
    /// Scheduler polling interval in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `data_dir()/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hours: HoursConfig,
    /// How many days ahead (today included) are open for booking.
    #[serde(default = "default_horizon_days")]
    pub booking_horizon_days: u32,
    /// Offered durations in minutes, ascending.
    #[serde(default = "default_durations")]
    pub durations_min: Vec<u32>,
    #[serde(default)]
    pub reminders: RemindersConfig,
    /// Override for the SQLite file; defaults to `data_dir()/meetroom.db`.
    #[serde(default)]
    pub database_file: Option<PathBuf>,
}

// Default functions
fn default_hours_start() -> String {
    "08:00".into()
}
fn default_hours_end() -> String {
    "20:00".into()
}
fn default_horizon_days() -> u32 {
    14
}
fn default_durations() -> Vec<u32> {
    vec![15, 30, 45, 60, 75, 90, 105, 120, 150, 180, 210, 240]
}
fn default_true() -> bool {
    true
}
fn default_lookahead_min() -> u32 {
    15
}
fn default_tick_secs() -> u64 {
    60
}

impl Default for HoursConfig {
    fn default() -> Self {
        Self {
            start: default_hours_start(),
            end: default_hours_end(),
        }
    }
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookahead_min: default_lookahead_min(),
            tick_secs: default_tick_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hours: HoursConfig::default(),
            booking_horizon_days: default_horizon_days(),
            durations_min: default_durations(),
            reminders: RemindersConfig::default(),
            database_file: None,
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
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(format!("cannot parse '{value}' as number").into());
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value)?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
        }

        Err(format!("unknown config key: {key}").into())
    }

    /// Path of the config file on disk.
    pub fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
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

    /// Set a config value by key and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be
    /// parsed, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }

    /// The parsed working-hours window.
    pub fn working_hours(&self) -> Result<WorkingHours, ValidationError> {
        WorkingHours::parse(&self.hours.start, &self.hours.end)
    }

    /// Resolve the SQLite file path, honoring the override.
    pub fn database_path(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        match &self.database_file {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("meetroom.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.hours.start, "08:00");
        assert_eq!(parsed.booking_horizon_days, 14);
        assert_eq!(parsed.reminders.lookahead_min, 15);
        assert_eq!(parsed.durations_min.len(), 12);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str("[reminders]\nenabled = false\n").unwrap();
        assert!(!cfg.reminders.enabled);
        assert_eq!(cfg.reminders.tick_secs, 60);
        assert_eq!(cfg.hours.end, "20:00");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("hours.start").as_deref(), Some("08:00"));
        assert_eq!(cfg.get("reminders.lookahead_min").as_deref(), Some("15"));
        assert_eq!(cfg.get("booking_horizon_days").as_deref(), Some("14"));
        assert!(cfg.get("hours.missing_key").is_none());
    }

    #[test]
    fn set_json_value_by_path_updates_nested_values() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "reminders.enabled", "false").unwrap();
        Config::set_json_value_by_path(&mut json, "reminders.lookahead_min", "30").unwrap();
        assert_eq!(
            Config::get_json_value_by_path(&json, "reminders.enabled").unwrap(),
            &serde_json::Value::Bool(false)
        );
        assert_eq!(
            Config::get_json_value_by_path(&json, "reminders.lookahead_min").unwrap(),
            &serde_json::Value::Number(30.into())
        );
    }

    #[test]
    fn set_json_value_by_path_rejects_unknown_key() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        assert!(Config::set_json_value_by_path(&mut json, "hours.nonexistent", "x").is_err());
        assert!(Config::set_json_value_by_path(&mut json, "reminders.enabled", "not_a_bool").is_err());
    }

    #[test]
    fn working_hours_parse_and_validate() {
        let cfg = Config::default();
        let hours = cfg.working_hours().unwrap();
        assert_eq!(hours.time_grid().len(), 25);

        let mut bad = Config::default();
        bad.hours.end = "07:00".into();
        assert!(bad.working_hours().is_err());
    }
}
