//! # Reading Aggregation
//!
//! Collapses a batch of raw readings into one low-resolution reading when the
//! high-resolution tier overflows. The reduction is pure: same batch in, same
//! aggregate out.
//!
//! ## Rules
//! - **timestamp**: the newest reading's
//! - **temperature / humidity / light**: arithmetic mean, see [`MeanPolicy`]
//! - **tank level, pump, lights**: the newest reading's (latest state wins)
//! - **irrigated**: see [`IrrigatedPolicy`]
//!
//! The legacy variants reproduce older devices, which averaged error sentinels
//! into the mean and kept only the newest irrigation flag. Receivers that depend
//! on that can opt in through `[telemetry.aggregation]`.

use crate::{Reading, SENSOR_ERROR_HUM, SENSOR_ERROR_LIGHT, SENSOR_ERROR_TEMP};
use serde::{Deserialize, Serialize};

/// How unavailable sensor values enter the mean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeanPolicy {
    /// Average only the available values; none available gives `None`.
    #[default]
    SkipUnavailable,
    /// Legacy: count unavailable values as their error sentinel.
    IncludeSentinel,
}

/// How the `irrigated` flag of a batch is reduced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigatedPolicy {
    /// True if any reading in the batch saw an irrigation.
    #[default]
    Any,
    /// Legacy: the newest reading's flag.
    Latest,
}

/// Policy pair applied by [`Aggregator::aggregate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationPolicy {
    #[serde(default)]
    pub mean: MeanPolicy,
    #[serde(default)]
    pub irrigated: IrrigatedPolicy,
}

/// Reduces a batch of readings to one summarized reading.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aggregator {
    policy: AggregationPolicy,
}

impl Aggregator {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    /// Aggregate `readings` (oldest first). Empty input gives `None` and the
    /// caller must not store anything.
    pub fn aggregate(&self, readings: &[Reading]) -> Option<Reading> {
        let latest = readings.last()?;

        let irrigated = match self.policy.irrigated {
            IrrigatedPolicy::Any => readings.iter().any(|r| r.irrigated),
            IrrigatedPolicy::Latest => latest.irrigated,
        };

        Some(Reading {
            timestamp: latest.timestamp,
            temperature: self.mean(readings, |r| r.temperature, SENSOR_ERROR_TEMP),
            humidity: self.mean(readings, |r| r.humidity, SENSOR_ERROR_HUM),
            light: self.mean(readings, |r| r.light, SENSOR_ERROR_LIGHT),
            tank_level: latest.tank_level,
            pump_on: latest.pump_on,
            lights_on: latest.lights_on,
            irrigated,
        })
    }

    fn mean(
        &self,
        readings: &[Reading],
        field: impl Fn(&Reading) -> Option<f32>,
        sentinel: f32,
    ) -> Option<f32> {
        let (sum, count) = match self.policy.mean {
            MeanPolicy::SkipUnavailable => readings
                .iter()
                .filter_map(&field)
                .fold((0.0f32, 0usize), |(sum, n), v| (sum + v, n + 1)),
            MeanPolicy::IncludeSentinel => readings
                .iter()
                .map(|r| field(r).unwrap_or(sentinel))
                .fold((0.0f32, 0usize), |(sum, n), v| (sum + v, n + 1)),
        };

        if count == 0 {
            return None;
        }
        let mean = sum / count as f32;

        // An all-sentinel legacy batch averages back to the sentinel itself
        if self.policy.mean == MeanPolicy::IncludeSentinel && mean == sentinel {
            return None;
        }
        Some(mean)
    }
}
