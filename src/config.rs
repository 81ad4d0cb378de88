//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! greenhouse-config.toml file. It provides a centralized way to configure
//! device identity, the MQTT broker, telemetry timing, default setpoints and
//! logging.
//!
//! Every section has defaults, so a file only needs the values that differ.

use crate::aggregate::AggregationPolicy;
use crate::setpoints::Setpoints;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "greenhouse-config.toml";

/// Errors from reading or writing the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialization: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration loaded from greenhouse-config.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Device identity
    pub device: DeviceConfig,
    /// Broker connection
    pub mqtt: MqttConfig,
    /// Sampling, flushing and aggregation
    pub telemetry: TelemetryConfig,
    /// Setpoints used until the first update arrives over MQTT
    pub setpoints: Setpoints,
    /// Relay and switch GPIO pins
    pub hardware: HardwareConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Device identification
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// MQTT client identifier
    pub client_id: String,
    /// Greenhouse UUID; used in topics and as `device_id` in telemetry
    pub greenhouse_id: String,
}

/// MQTT broker configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Leave empty if the broker has no authentication
    pub username: String,
    pub password: String,
    pub keep_alive_secs: u64,
    /// Minimum time between two reconnection attempts
    pub reconnect_interval_ms: u64,
    /// Outgoing request queue between the control loop and the network task
    pub queue_capacity: usize,
}

/// Telemetry timing and aggregation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Seconds between two sample → control → publish passes
    pub interval_secs: u64,
    /// Pause between messages while flushing buffered data
    pub flush_delay_ms: u64,
    /// Main loop sleep between iterations
    pub loop_delay_ms: u64,
    pub aggregation: AggregationPolicy,
}

/// BCM GPIO pin assignment, only used with the `hardware` feature
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub pump_pin: u8,
    pub heater_pin: u8,
    pub fan_pin: u8,
    pub lights_pin: u8,
    /// Float switch, high when the tank has water
    pub tank_pin: u8,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "greenhouse_lib=debug"
    pub level: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            client_id: "greenhouse-controller-001".to_string(),
            greenhouse_id: "00000000-0000-0000-0000-000000000000".to_string(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 30,
            reconnect_interval_ms: 5000,
            queue_capacity: 32,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            interval_secs: 60,
            flush_delay_ms: 100,
            loop_delay_ms: 100,
            aggregation: AggregationPolicy::default(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        HardwareConfig {
            pump_pin: 21,
            heater_pin: 18,
            fan_pin: 19,
            lights_pin: 25,
            tank_pin: 13,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl MqttConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }
}

impl Config {
    /// Load configuration from greenhouse-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_path(&path) {
            Ok(config) => {
                info!(
                    path = %path.as_ref().display(),
                    greenhouse = %config.device.greenhouse_id,
                    "loaded configuration"
                );
                config
            }
            Err(ConfigError::Io(e)) => {
                info!(
                    path = %path.as_ref().display(),
                    "no config file ({e}), using default configuration"
                );
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.as_ref().display(), "{e}, using default configuration");
                Self::default()
            }
        }
    }

    /// Load configuration from `path`, reporting why it failed.
    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save current configuration to greenhouse-config.toml
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_path(DEFAULT_CONFIG_PATH)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{IrrigatedPolicy, MeanPolicy};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.reconnect_interval(), Duration::from_secs(5));
        assert_eq!(config.telemetry.interval(), Duration::from_secs(60));
        assert_eq!(config.telemetry.flush_delay(), Duration::from_millis(100));
        assert_eq!(config.setpoints.target_temp_min, 22.0);
        assert_eq!(config.setpoints.target_temp_max, 24.0);
        assert_eq!(config.hardware.pump_pin, 21);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[device]
greenhouse_id = "550e8400-e29b-41d4-a716-446655440000"

[telemetry]
interval_secs = 10

[telemetry.aggregation]
mean = "include_sentinel"
irrigated = "latest"
"#
        )
        .unwrap();

        let config = Config::try_load_from_path(file.path()).unwrap();
        assert_eq!(
            config.device.greenhouse_id,
            "550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(config.device.client_id, "greenhouse-controller-001");
        assert_eq!(config.telemetry.interval_secs, 10);
        assert_eq!(config.telemetry.flush_delay_ms, 100);
        assert_eq!(config.telemetry.aggregation.mean, MeanPolicy::IncludeSentinel);
        assert_eq!(
            config.telemetry.aggregation.irrigated,
            IrrigatedPolicy::Latest
        );
        assert_eq!(config.mqtt, MqttConfig::default());
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt]\nport = \"not a number\"").unwrap();

        assert!(matches!(
            Config::try_load_from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(Config::load_from_path(file.path()), Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.mqtt.host = "broker.local".to_string();
        config.setpoints.irrigation_interval_minutes = 30;

        config.save_to_path(file.path()).unwrap();
        let loaded = Config::try_load_from_path(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
