//! # Greenhouse Controller Core Library
//!
//! This library provides the data structures and the offline-resilient telemetry
//! pipeline for an autonomous greenhouse controller. It's designed for small
//! single-board computers that sit next to the plants and report over a flaky
//! WiFi link.
//!
//! ## Design Philosophy
//!
//! ### Memory Efficiency
//! - **Fixed-size buffers**: Both buffer tiers are const-generic ring buffers backed
//!   by plain arrays, so buffering during an outage never allocates
//! - **Copy readings**: [`Reading`] is a small `Copy` value; buffers hand out copies
//!   and never expose their slots
//!
//! ### Two-Tier Degradation
//! While the broker is unreachable, raw readings (one per sample cycle) go to the
//! high-resolution tier. When that tier fills up it is averaged into a single
//! reading and moved to the low-resolution tier. Only when *both* tiers are full
//! is anything discarded, and then it is always the oldest aggregate.
//!
//! ### Data Flow
//! 1. **Online**: sample → control rules → publish immediately
//! 2. **Offline**: sample → control rules → buffer (aggregate on overflow)
//! 3. **Reconnect**: flush low-resolution tier, then high-resolution tier, in order
//!
//! ## Core Types
//!
//! - [`Reading`]: one timestamped snapshot of sensor and actuator state
//! - [`publisher::TelemetryPublisher`]: send-or-buffer entry point
//! - [`connection::ConnectionMonitor`]: reconnect edge detection and flush trigger
//! - [`controller::Greenhouse`]: the single owning context that runs the loop

use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod connection;
pub mod control;
pub mod controller;
pub mod hardware;
pub mod payload;
pub mod publisher;
pub mod setpoints;
pub mod transport;

/// Temperature sensor error value (°C).
pub const SENSOR_ERROR_TEMP: f32 = -999.0;
/// Humidity sensor error value (%).
pub const SENSOR_ERROR_HUM: f32 = -999.0;
/// Light sensor error value (lux).
pub const SENSOR_ERROR_LIGHT: f32 = -1.0;

/// One timestamped snapshot of sensor and actuator state.
///
/// Sensor fields are `None` when the sensor reported its error sentinel. The
/// sentinels only exist at the hardware boundary (see [`hardware::Sensor`]);
/// inside the pipeline an unavailable value is always `None`, and the wire
/// payload simply omits it.
///
/// Memory layout is 3 × `Option<f32>` + `i64` + 4 × `bool`, about 40 bytes, so
/// twenty buffered readings fit comfortably on the stack.
///
/// # Example
/// ```
/// use greenhouse_lib::Reading;
///
/// let reading = Reading {
///     timestamp: 1_700_000_000,
///     temperature: Some(22.5),
///     humidity: None,
///     light: Some(480.0),
///     tank_level: true,
///     pump_on: false,
///     lights_on: false,
///     irrigated: true,
/// };
///
/// assert!(reading.humidity.is_none());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Seconds since the Unix epoch (or an uptime placeholder before time sync)
    pub timestamp: i64,
    /// Air temperature in °C
    pub temperature: Option<f32>,
    /// Relative air humidity in %
    pub humidity: Option<f32>,
    /// Light intensity in lux
    pub light: Option<f32>,
    /// True while the water tank has water
    pub tank_level: bool,
    /// Pump relay state at sampling time
    pub pump_on: bool,
    /// Grow light relay state at sampling time
    pub lights_on: bool,
    /// True iff an irrigation cycle completed since the previous reading left the device
    pub irrigated: bool,
}
