//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::schedule::{Department, DepartmentCapacity, SchedulePolicy, MAX_ALERT_RETENTION_HOURS};
use crate::store::{FallbackRepository, JsonFileRepository, Repository, StoreConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub capacity: CapacityConfig,

    #[serde(default)]
    pub hours: SchedulePolicy,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Persistence and alert settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Local copy used when `data_file` cannot be read or written
    #[serde(default)]
    pub fallback_file: Option<String>,

    #[serde(default = "default_alert_retention")]
    pub alert_retention_hours: i64,

    #[serde(default = "default_alert_channel_capacity")]
    pub alert_channel_capacity: usize,
}

fn default_data_file() -> String {
    dirs::data_local_dir()
        .map(|p| {
            p.join("clinicflow")
                .join("appointments.json")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./clinicflow_data/appointments.json".to_string())
}

fn default_alert_retention() -> i64 {
    4
}

fn default_alert_channel_capacity() -> usize {
    256
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            fallback_file: None,
            alert_retention_hours: default_alert_retention(),
            alert_channel_capacity: default_alert_channel_capacity(),
        }
    }
}

/// Doctors per department
#[derive(Debug, Clone, Deserialize)]
pub struct CapacityConfig {
    #[serde(default = "default_general")]
    pub general: u32,
    #[serde(default = "default_cardiology")]
    pub cardiology: u32,
    #[serde(default = "default_orthopedics")]
    pub orthopedics: u32,
    #[serde(default = "default_neurology")]
    pub neurology: u32,
    #[serde(default = "default_emergency")]
    pub emergency: u32,
}

fn default_general() -> u32 {
    3
}

fn default_cardiology() -> u32 {
    2
}

fn default_orthopedics() -> u32 {
    2
}

fn default_neurology() -> u32 {
    1
}

fn default_emergency() -> u32 {
    5
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            general: default_general(),
            cardiology: default_cardiology(),
            orthopedics: default_orthopedics(),
            neurology: default_neurology(),
            emergency: default_emergency(),
        }
    }
}

impl CapacityConfig {
    fn entries(&self) -> [(Department, u32); 5] {
        [
            (Department::General, self.general),
            (Department::Cardiology, self.cardiology),
            (Department::Orthopedics, self.orthopedics),
            (Department::Neurology, self.neurology),
            (Department::Emergency, self.emergency),
        ]
    }

    pub fn to_capacities(&self) -> Result<DepartmentCapacity, ConfigError> {
        let mut capacities = DepartmentCapacity::default();
        for (department, count) in self.entries() {
            capacities
                .set(department, count)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(capacities)
    }
}

/// Background sweep configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("clinicflow").join("config.toml")),
            Some(PathBuf::from("/etc/clinicflow/config.toml")),
            Some(PathBuf::from("./clinicflow.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_file) = std::env::var("CLINICFLOW_DATA_FILE") {
            self.store.data_file = data_file;
        }
        if let Ok(fallback) = std::env::var("CLINICFLOW_FALLBACK_FILE") {
            self.store.fallback_file = Some(fallback);
        }

        if let Ok(interval) = std::env::var("CLINICFLOW_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse() {
                self.sweep.interval_secs = secs;
            }
        }

        if let Ok(level) = std::env::var("CLINICFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CLINICFLOW_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capacity.to_capacities()?;

        if self.hours.slot_minutes == 0 {
            return Err(ConfigError::Invalid(
                "hours.slot_minutes must be at least 1".to_string(),
            ));
        }
        if self.hours.opening > self.hours.last_slot {
            return Err(ConfigError::Invalid(
                "hours.opening must not be after hours.last_slot".to_string(),
            ));
        }
        if !(1..=MAX_ALERT_RETENTION_HOURS).contains(&self.store.alert_retention_hours) {
            return Err(ConfigError::Invalid(format!(
                "store.alert_retention_hours must be between 1 and {}",
                MAX_ALERT_RETENTION_HOURS
            )));
        }
        if self.sweep.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Store settings derived from this config
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        Ok(StoreConfig {
            sweep_interval_secs: self.sweep.interval_secs,
            alert_retention_hours: self.store.alert_retention_hours,
            alert_channel_capacity: self.store.alert_channel_capacity,
            capacities: self.capacity.to_capacities()?,
            policy: self.hours,
        })
    }

    /// Persistence backend: the data file, behind a fallback file if one is set
    pub fn repository(&self) -> Arc<dyn Repository> {
        let primary = JsonFileRepository::new(&self.store.data_file);
        match &self.store.fallback_file {
            Some(fallback) => Arc::new(FallbackRepository::new(
                Box::new(primary),
                Box::new(JsonFileRepository::new(fallback)),
            )),
            None => Arc::new(primary),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Clinicflow Configuration
#
# Environment variables override these settings:
# - CLINICFLOW_DATA_FILE
# - CLINICFLOW_FALLBACK_FILE
# - CLINICFLOW_SWEEP_INTERVAL_SECS
# - CLINICFLOW_LOG_LEVEL
# - CLINICFLOW_LOG_FORMAT

[store]
# Appointment snapshot (JSON)
data_file = "~/.local/share/clinicflow/appointments.json"

# Local copy used when data_file is unreachable
# fallback_file = "/tmp/clinicflow_appointments.json"

# How long an alert stays active (hours)
alert_retention_hours = 4

# Alerts buffered per subscriber
alert_channel_capacity = 256

[capacity]
# Doctors per department; each sees one patient at a time
general = 3
cardiology = 2
orthopedics = 2
neurology = 1
emergency = 5

[hours]
# First slot of the day
opening = "09:00"

# Non-emergency bookings before this move to the next day
emergency_only_until = "09:00"

# Last slot start (inclusive)
last_slot = "21:00"

# Slot granularity (minutes)
slot_minutes = 30

[sweep]
# Seconds between expiry/overcrowding sweeps
interval_secs = 60

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use tempfile::TempDir;

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        config.validate().unwrap();

        let capacities = config.capacity.to_capacities().unwrap();
        assert_eq!(capacities, DepartmentCapacity::default());
        assert_eq!(config.hours, SchedulePolicy::default());
        assert_eq!(config.sweep.interval_secs, 60);
        assert!(config.store.fallback_file.is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [capacity]
            neurology = 3

            [hours]
            last_slot = "17:30"
            "#,
        )
        .unwrap();

        let store = config.store_config().unwrap();
        assert_eq!(store.capacities.get(Department::Neurology), 3);
        assert_eq!(store.capacities.get(Department::General), 3);
        assert_eq!(store.policy.last_slot, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
        assert_eq!(store.policy.slot_minutes, 30);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[capacity]\ncardiology = 0\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_alert_retention_out_of_range_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        std::fs::write(&path, "[store]\nalert_retention_hours = 3000000000\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("alert_retention_hours")));

        std::fs::write(&path, "[store]\nalert_retention_hours = 0\n").unwrap();
        assert!(Config::load(&path).is_err());

        std::fs::write(&path, "[store]\nalert_retention_hours = 8760\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().store.alert_retention_hours, 8760);
    }

    #[test]
    fn test_load_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "[store\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::load(&temp_dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_logging_format() {
        let mut logging = LoggingConfig::default();
        assert!(!logging.is_json());
        logging.format = "JSON".to_string();
        assert!(logging.is_json());
    }
}
