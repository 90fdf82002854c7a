//! Configuration management for safeguard.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::alert::GeoPoint;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "safeguard";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "alerts.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SAFEGUARD_`, sections split on `__`)
/// 2. TOML config file at `~/.config/safeguard/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Press detector configuration.
    pub detector: DetectorConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Who alerts are raised for.
    pub identity: IdentityConfig,
    /// Alert content and confirmation.
    pub alert: AlertConfig,
    /// Location provider configuration.
    pub location: LocationConfig,
    /// Press source configuration.
    pub source: SourceConfig,
}

/// Press detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Presses required to trigger an alert.
    pub required_presses: usize,
    /// Maximum spacing between consecutive presses in milliseconds.
    pub max_gap_ms: u64,
    /// Upper bound on a running trigger action in milliseconds.
    /// Set to 0 to let trigger actions run unbounded.
    pub trigger_timeout_ms: u64,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/safeguard/alerts.db`
    pub database_path: Option<PathBuf>,
}

/// Identity configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// The subject alerts are raised for. Unset means nobody is signed in.
    pub subject_id: Option<String>,
}

/// Alert content configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Category name looked up for power-button alerts.
    pub category_name: String,
    /// Message stored on power-button alerts.
    pub trigger_message: String,
    /// Observation stored on power-button alerts.
    pub trigger_observation: String,
    /// Message stored on manually sent alerts.
    pub manual_message: String,
    /// Length of the confirmation pulse in milliseconds.
    pub haptic_pulse_ms: u64,
}

/// Location provider configuration.
///
/// When both coordinates are set, they are reported as the last known fix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Fixed latitude in degrees.
    pub latitude: Option<f64>,
    /// Fixed longitude in degrees.
    pub longitude: Option<f64>,
}

/// Where press events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Newline-delimited events on standard input.
    #[default]
    Stdin,
    /// Power button events from the acpid socket (Linux).
    Acpi,
}

/// Press source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Which source to listen on.
    pub kind: SourceKind,
    /// Path to the acpid event socket.
    pub acpi_socket_path: PathBuf,
    /// Regex an acpid event line must match to count as a press.
    pub acpi_event_pattern: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            required_presses: 5,
            max_gap_ms: 1000,
            trigger_timeout_ms: 0,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            category_name: "CRITICAL ALERT".to_string(),
            trigger_message: String::new(),
            trigger_observation: "alert sent from power button".to_string(),
            manual_message: "Emergency alert".to_string(),
            haptic_pulse_ms: 1200,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Stdin,
            acpi_socket_path: PathBuf::from("/var/run/acpid.socket"),
            acpi_event_pattern: r"^button/power\b".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SAFEGUARD_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.detector.required_presses < 2 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "required_presses ({}) must be at least 2",
                    self.detector.required_presses
                ),
            });
        }

        if self.detector.max_gap_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "max_gap_ms must be greater than 0".to_string(),
            });
        }

        if regex::Regex::new(&self.source.acpi_event_pattern).is_err() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "invalid regex pattern: {}",
                    self.source.acpi_event_pattern
                ),
            });
        }

        match (self.location.latitude, self.location.longitude) {
            (None, None) => {}
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(Error::ConfigValidation {
                        message: format!("location ({lat}, {lon}) is out of range"),
                    });
                }
            }
            _ => {
                return Err(Error::ConfigValidation {
                    message: "latitude and longitude must be set together".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the maximum press gap as a Duration.
    #[must_use]
    pub fn max_gap(&self) -> Duration {
        Duration::from_millis(self.detector.max_gap_ms)
    }

    /// Get the trigger timeout, if one is configured.
    #[must_use]
    pub fn trigger_timeout(&self) -> Option<Duration> {
        if self.detector.trigger_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.detector.trigger_timeout_ms))
        }
    }

    /// Get the confirmation pulse length as a Duration.
    #[must_use]
    pub fn haptic_pulse(&self) -> Duration {
        Duration::from_millis(self.alert.haptic_pulse_ms)
    }

    /// Get the configured fixed location, if any.
    #[must_use]
    pub fn fixed_location(&self) -> Option<GeoPoint> {
        match (self.location.latitude, self.location.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.detector.required_presses, 5);
        assert_eq!(config.detector.max_gap_ms, 1000);
        assert!(config.identity.subject_id.is_none());
        assert_eq!(config.source.kind, SourceKind::Stdin);
    }

    #[test]
    fn test_default_alert_config() {
        let alert = AlertConfig::default();

        assert_eq!(alert.category_name, "CRITICAL ALERT");
        assert!(alert.trigger_message.is_empty());
        assert_eq!(alert.haptic_pulse_ms, 1200);
    }

    #[test]
    fn test_default_source_config() {
        let source = SourceConfig::default();

        assert_eq!(source.acpi_socket_path, PathBuf::from("/var/run/acpid.socket"));
        assert!(regex::Regex::new(&source.acpi_event_pattern).is_ok());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_single_press() {
        let mut config = Config::default();
        config.detector.required_presses = 1;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("required_presses"));
    }

    #[test]
    fn test_validate_zero_gap() {
        let mut config = Config::default();
        config.detector.max_gap_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_gap_ms"));
    }

    #[test]
    fn test_validate_invalid_regex() {
        let mut config = Config::default();
        config.source.acpi_event_pattern = "[invalid".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_validate_half_location() {
        let mut config = Config::default();
        config.location.latitude = Some(4.6);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("together"));
    }

    #[test]
    fn test_validate_location_out_of_range() {
        let mut config = Config::default();
        config.location.latitude = Some(91.0);
        config.location.longitude = Some(0.0);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fixed_location() {
        let mut config = Config::default();
        assert!(config.fixed_location().is_none());

        config.location.latitude = Some(4.711);
        config.location.longitude = Some(-74.072);
        let point = config.fixed_location().unwrap();
        assert!((point.latitude - 4.711).abs() < f64::EPSILON);
        assert!((point.longitude + 74.072).abs() < f64::EPSILON);
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("alerts.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let mut config = Config::default();
        assert_eq!(config.max_gap(), Duration::from_millis(1000));
        assert_eq!(config.haptic_pulse(), Duration::from_millis(1200));
        assert!(config.trigger_timeout().is_none());

        config.detector.trigger_timeout_ms = 30_000;
        assert_eq!(config.trigger_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("safeguard"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("safeguard-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            "[detector]\nrequired_presses = 3\nmax_gap_ms = 750\n\n[source]\nkind = \"acpi\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.detector.required_presses, 3);
        assert_eq!(config.detector.max_gap_ms, 750);
        assert_eq!(config.source.kind, SourceKind::Acpi);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_source_kind_serialize() {
        let json = serde_json::to_string(&SourceKind::Acpi).unwrap();
        assert_eq!(json, "\"acpi\"");
    }

    #[test]
    fn test_detector_config_deserialize() {
        let json = r#"{"required_presses": 4}"#;
        let detector: DetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(detector.required_presses, 4);
        assert_eq!(detector.max_gap_ms, 1000);
    }
}
