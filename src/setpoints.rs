//! # Control Setpoints
//!
//! Targets the control rules steer towards. The device boots with the values
//! from the configuration file and replaces them whenever the backend
//! publishes a new set on `greenhouse/{greenhouse_id}/setpoints`.
//!
//! ## Inbound Message
//! ```json
//! {
//!   "target_temp_min": 22.0,
//!   "target_temp_max": 24.0,
//!   "target_hum_air_max": 70.0,
//!   "target_light_intensity": 500.0,
//!   "irrigation_interval_minutes": 60,
//!   "irrigation_duration_seconds": 20,
//!   "changed_at": "2025-07-24T12:00:00"
//! }
//! ```
//! All six targets are required; anything else (like `changed_at`) is ignored.
//! A message that fails to parse or validate is rejected as a whole, and the
//! current setpoints stay in force.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a setpoint message was rejected.
#[derive(Error, Debug)]
pub enum SetpointError {
    #[error("malformed setpoint message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} = {value} outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("target_temp_max ({max}) must be greater than target_temp_min ({min})")]
    InvertedTemperatureRange { min: f32, max: f32 },
}

/// Active control targets.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Setpoints {
    /// Heater switches on below this (°C)
    pub target_temp_min: f32,
    /// Heater switches off at, and fan on above, this (°C)
    pub target_temp_max: f32,
    /// Fan switches on above this relative humidity (%)
    pub target_hum_air_max: f32,
    /// Target light intensity (lux)
    pub target_light_intensity: f32,
    /// Minutes between irrigation starts
    pub irrigation_interval_minutes: u32,
    /// Seconds the pump runs per irrigation
    pub irrigation_duration_seconds: u32,
}

impl Default for Setpoints {
    fn default() -> Self {
        Setpoints {
            target_temp_min: 22.0,
            target_temp_max: 24.0,
            target_hum_air_max: 70.0,
            target_light_intensity: 500.0,
            irrigation_interval_minutes: 1,
            irrigation_duration_seconds: 20,
        }
    }
}

/// Wire shape of an update; unlike [`Setpoints`] every field is required.
#[derive(Debug, Deserialize)]
struct SetpointMessage {
    target_temp_min: f32,
    target_temp_max: f32,
    target_hum_air_max: f32,
    target_light_intensity: f32,
    irrigation_interval_minutes: u32,
    irrigation_duration_seconds: u32,
}

impl Setpoints {
    /// Parse and validate an inbound setpoint message.
    pub fn from_message(payload: &[u8]) -> Result<Self, SetpointError> {
        let msg: SetpointMessage = serde_json::from_slice(payload)?;
        let setpoints = Setpoints {
            target_temp_min: msg.target_temp_min,
            target_temp_max: msg.target_temp_max,
            target_hum_air_max: msg.target_hum_air_max,
            target_light_intensity: msg.target_light_intensity,
            irrigation_interval_minutes: msg.irrigation_interval_minutes,
            irrigation_duration_seconds: msg.irrigation_duration_seconds,
        };
        setpoints.validate()?;
        Ok(setpoints)
    }

    /// Check every target against the ranges the backend accepts.
    pub fn validate(&self) -> Result<(), SetpointError> {
        check_range("target_temp_min", self.target_temp_min.into(), 0.0, 40.0)?;
        check_range("target_temp_max", self.target_temp_max.into(), 0.0, 50.0)?;
        if self.target_temp_max <= self.target_temp_min {
            return Err(SetpointError::InvertedTemperatureRange {
                min: self.target_temp_min,
                max: self.target_temp_max,
            });
        }
        check_range("target_hum_air_max", self.target_hum_air_max.into(), 0.0, 100.0)?;
        check_range(
            "irrigation_interval_minutes",
            self.irrigation_interval_minutes.into(),
            1.0,
            1440.0,
        )?;
        check_range(
            "irrigation_duration_seconds",
            self.irrigation_duration_seconds.into(),
            1.0,
            600.0,
        )?;
        check_range(
            "target_light_intensity",
            self.target_light_intensity.into(),
            0.0,
            100_000.0,
        )?;
        Ok(())
    }

    pub fn irrigation_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.irrigation_interval_minutes) * 60)
    }

    pub fn irrigation_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.irrigation_duration_seconds))
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), SetpointError> {
    // NaN fails both comparisons and is rejected too
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(SetpointError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "target_temp_min": 18.0,
        "target_temp_max": 26.5,
        "target_hum_air_max": 80.0,
        "target_light_intensity": 1200.0,
        "irrigation_interval_minutes": 90,
        "irrigation_duration_seconds": 45,
        "changed_at": "2025-07-24T12:00:00"
    }"#;

    #[test]
    fn parses_backend_message() {
        let setpoints = Setpoints::from_message(VALID.as_bytes()).unwrap();
        assert_eq!(setpoints.target_temp_min, 18.0);
        assert_eq!(setpoints.target_temp_max, 26.5);
        assert_eq!(setpoints.irrigation_interval(), Duration::from_secs(90 * 60));
        assert_eq!(setpoints.irrigation_duration(), Duration::from_secs(45));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Setpoints::from_message(b"{\"target_temp_min\": 18.0").unwrap_err();
        assert!(matches!(err, SetpointError::Json(_)));
    }

    #[test]
    fn rejects_missing_field() {
        let json = r#"{
            "target_temp_min": 18.0,
            "target_temp_max": 26.5,
            "target_hum_air_max": 80.0,
            "irrigation_interval_minutes": 90,
            "irrigation_duration_seconds": 45
        }"#;
        assert!(matches!(
            Setpoints::from_message(json.as_bytes()),
            Err(SetpointError::Json(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let json = VALID.replace(
            "\"irrigation_duration_seconds\": 45",
            "\"irrigation_duration_seconds\": 900",
        );
        match Setpoints::from_message(json.as_bytes()) {
            Err(SetpointError::OutOfRange { field, .. }) => {
                assert_eq!(field, "irrigation_duration_seconds")
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_temperature_range() {
        let json = VALID.replace("26.5", "12.0");
        assert!(matches!(
            Setpoints::from_message(json.as_bytes()),
            Err(SetpointError::InvertedTemperatureRange { .. })
        ));
    }

    #[test]
    fn defaults_are_valid() {
        assert!(Setpoints::default().validate().is_ok());
    }
}
