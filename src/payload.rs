//! # Telemetry Wire Format
//!
//! Readings leave the device as JSON on `greenhouse/{greenhouse_id}/telemetry`:
//!
//! ```json
//! {
//!   "device_id": "00000000-0000-0000-0000-000000000000",
//!   "timestamp": 1699459200,
//!   "sequence": 42,
//!   "temperature": 22.5,
//!   "humidity": 61.0,
//!   "tank_level": true,
//!   "irrigated_since_last_transmission": false,
//!   "lights_are_on": false,
//!   "pump_on": false
//! }
//! ```
//!
//! Unavailable sensor values are left out entirely (`light` above). The
//! receiver uses `sequence` to spot gaps, so it only advances when a message
//! was actually handed to the transport.

use crate::Reading;
use serde::Serialize;

/// Topic telemetry is published on.
pub fn telemetry_topic(greenhouse_id: &str) -> String {
    format!("greenhouse/{greenhouse_id}/telemetry")
}

/// Topic setpoint updates arrive on.
pub fn setpoint_topic(greenhouse_id: &str) -> String {
    format!("greenhouse/{greenhouse_id}/setpoints")
}

/// One telemetry message, borrowed from the reading it describes.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetryPayload<'a> {
    pub device_id: &'a str,
    pub timestamp: i64,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<f32>,
    pub tank_level: bool,
    pub irrigated_since_last_transmission: bool,
    pub lights_are_on: bool,
    pub pump_on: bool,
}

impl<'a> TelemetryPayload<'a> {
    pub fn new(device_id: &'a str, reading: &Reading, sequence: u64) -> Self {
        Self {
            device_id,
            timestamp: reading.timestamp,
            sequence,
            temperature: reading.temperature,
            humidity: reading.humidity,
            light: reading.light,
            tank_level: reading.tank_level,
            irrigated_since_last_transmission: reading.irrigated,
            lights_are_on: reading.lights_on,
            pump_on: reading.pump_on,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Monotonic 64-bit message counter. Never reset, never decremented.
///
/// The first message carries sequence 1.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next successful transmission will use.
    pub fn upcoming(&self) -> u64 {
        self.last + 1
    }

    /// Record that the upcoming number was used.
    pub fn advance(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last number that went out, 0 before the first message.
    pub fn last(&self) -> u64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn reading() -> Reading {
        Reading {
            timestamp: 1_699_459_200,
            temperature: Some(22.5),
            humidity: Some(61.0),
            light: None,
            tank_level: true,
            pump_on: false,
            lights_on: true,
            irrigated: true,
        }
    }

    #[test]
    fn payload_uses_receiver_field_names() {
        let json = TelemetryPayload::new("gh-1", &reading(), 7)
            .to_json()
            .unwrap();
        let value: Value = serde_json::from_slice(&json).unwrap();

        assert_eq!(value["device_id"], "gh-1");
        assert_eq!(value["timestamp"], 1_699_459_200);
        assert_eq!(value["sequence"], 7);
        assert_eq!(value["temperature"], 22.5);
        assert_eq!(value["humidity"], 61.0);
        assert_eq!(value["tank_level"], true);
        assert_eq!(value["irrigated_since_last_transmission"], true);
        assert_eq!(value["lights_are_on"], true);
        assert_eq!(value["pump_on"], false);
    }

    #[test]
    fn unavailable_fields_are_omitted() {
        let mut r = reading();
        r.temperature = None;
        let json = TelemetryPayload::new("gh-1", &r, 1).to_json().unwrap();
        let value: Value = serde_json::from_slice(&json).unwrap();
        let object = value.as_object().unwrap();

        assert!(!object.contains_key("temperature"));
        assert!(!object.contains_key("light"));
        assert!(object.contains_key("humidity"));
    }

    #[test]
    fn sequence_starts_at_one_and_only_moves_forward() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.last(), 0);
        assert_eq!(counter.upcoming(), 1);

        // Peeking does not consume a number
        assert_eq!(counter.upcoming(), 1);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 2);
        assert_eq!(counter.upcoming(), 3);
    }

    #[test]
    fn topics_follow_greenhouse_layout() {
        assert_eq!(telemetry_topic("abc"), "greenhouse/abc/telemetry");
        assert_eq!(setpoint_topic("abc"), "greenhouse/abc/setpoints");
    }
}
