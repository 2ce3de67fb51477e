use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Impact detection tunables
/// Longest confirmation window accepted (one hour)
pub const MAX_CONFIRMATION_WINDOW_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Magnitude (sensor native units, m/s^2 on Android) that must be exceeded
    pub threshold: f64,
    /// Seconds the rider has before the alert goes out
    pub confirmation_window_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 20.0,
            confirmation_window_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Bonded name of the bike unit
    pub device_name: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            device_name: "ESP32".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Prefix of the map link; `lat,lon` is appended
    pub map_link_base: String,
    /// Re-arm detection when the alert aborts for lack of a location fix.
    /// `false` leaves the candidate latched, as the first app release did.
    pub clear_pending_on_location_failure: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            map_link_base: "https://maps.google.com/?q=".to_string(),
            clear_pending_on_location_failure: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashGuardConfig {
    pub detection: DetectionConfig,
    pub pairing: PairingConfig,
    pub alert: AlertConfig,
}

impl CrashGuardConfig {
    /// Load from a JSON file. Missing sections and fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.detection.threshold.is_finite() || self.detection.threshold <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "detection.threshold must be a positive number, got {}",
                self.detection.threshold
            )));
        }
        if self.detection.confirmation_window_secs > MAX_CONFIRMATION_WINDOW_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "detection.confirmation_window_secs must be at most {}, got {}",
                MAX_CONFIRMATION_WINDOW_SECS, self.detection.confirmation_window_secs
            )));
        }
        if self.pairing.device_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "pairing.device_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn confirmation_window(&self) -> Duration {
        Duration::from_secs(self.detection.confirmation_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_app_constants() {
        let config = CrashGuardConfig::default();
        assert_eq!(config.detection.threshold, 20.0);
        assert_eq!(config.confirmation_window(), Duration::from_secs(30));
        assert_eq!(config.pairing.device_name, "ESP32");
        assert_eq!(config.alert.map_link_base, "https://maps.google.com/?q=");
        assert!(config.alert.clear_pending_on_location_failure);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CrashGuardConfig::from_json(r#"{"pairing": {"device_name": "BIKE-01"}}"#)
            .unwrap();
        assert_eq!(config.pairing.device_name, "BIKE-01");
        assert_eq!(config.detection.threshold, 20.0);
        assert_eq!(config.detection.confirmation_window_secs, 30);
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let err = CrashGuardConfig::from_json(r#"{"detection": {"threshold": 0.0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_rejects_oversized_window() {
        let err = CrashGuardConfig::from_json(
            r#"{"detection": {"confirmation_window_secs": 18446744073709551615}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let mut config = CrashGuardConfig::default();
        config.detection.confirmation_window_secs = MAX_CONFIRMATION_WINDOW_SECS;
        assert!(config.validate().is_ok());
        config.detection.confirmation_window_secs += 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = CrashGuardConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CrashGuardConfig::load("/nonexistent/crashguard.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
