//! # Greenhouse Controller
//!
//! [`Greenhouse`] owns every piece of mutable state: sensors, relays, control
//! rules, both buffer tiers, the connection monitor and the transport. The
//! binary calls [`Greenhouse::step`] in a loop; each call
//!
//! 1. applies setpoint updates that arrived since the last step
//! 2. ticks the connection monitor (reconnect, flush on reconnection)
//! 3. once per telemetry interval: samples the sensors
//! 4. runs the control rules against the latest sample
//! 5. once per telemetry interval: publishes the reading
//!
//! The rules run on every step so the pump timer keeps loop resolution. The
//! connectivity seen by the monitor is the one used for publishing, so no live
//! reading overtakes a backlog that has not been flushed yet.
//!
//! Nothing here blocks except the optional pause between flushed messages.

use crate::clock::TimestampSource;
use crate::config::Config;
use crate::connection::{ConnectionMonitor, FlushController, TickOutcome};
use crate::control::{Actuators, ControlRules, IrrigationStatus};
use crate::hardware::{Relay, Sensor, SimulatedSensor, SimulatedTank, TankSensor};
use crate::payload::setpoint_topic;
use crate::publisher::{PublishOutcome, TelemetryPublisher};
use crate::setpoints::Setpoints;
use crate::transport::{InboundMessage, Transport};
use crate::Reading;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The sensors sampled every cycle.
pub struct Sensors {
    pub temperature: Box<dyn Sensor>,
    pub humidity: Box<dyn Sensor>,
    pub light: Box<dyn Sensor>,
    pub tank: Box<dyn TankSensor>,
}

impl Sensors {
    /// Mock sensors with plausible greenhouse values and a full tank.
    pub fn simulated() -> Self {
        Self {
            temperature: Box::new(SimulatedSensor::temperature()),
            humidity: Box::new(SimulatedSensor::humidity()),
            light: Box::new(SimulatedSensor::light()),
            tank: Box::new(SimulatedTank { water: true }),
        }
    }
}

impl Actuators {
    /// In-memory relays, all off.
    pub fn simulated() -> Self {
        Self {
            pump: Box::new(Relay::new("pump")),
            heater: Box::new(Relay::new("heater")),
            fan: Box::new(Relay::new("fan")),
            lights: Box::new(Relay::new("lights")),
        }
    }
}

/// Sensor values from the most recent sample cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    temperature: Option<f32>,
    humidity: Option<f32>,
    light: Option<f32>,
    tank_level: bool,
}

/// Single owner of the control loop state.
pub struct Greenhouse<T: Transport> {
    sensors: Sensors,
    actuators: Actuators,
    rules: ControlRules,
    publisher: TelemetryPublisher,
    monitor: ConnectionMonitor,
    flusher: FlushController,
    clock: TimestampSource,
    transport: T,
    setpoint_topic: String,
    interval: Duration,
    last_cycle: Option<Instant>,
    latest: Option<Sample>,
}

impl<T: Transport> Greenhouse<T> {
    /// Wire everything up and subscribe to setpoint updates.
    ///
    /// Configured setpoints that fail validation are replaced by the defaults.
    pub fn new(
        config: &Config,
        sensors: Sensors,
        actuators: Actuators,
        mut transport: T,
        now: Instant,
    ) -> Self {
        let greenhouse_id = &config.device.greenhouse_id;
        let topic = setpoint_topic(greenhouse_id);
        if let Err(e) = transport.subscribe(&topic) {
            warn!(topic = %topic, "setpoint subscription failed: {e}");
        }

        let setpoints = match config.setpoints.validate() {
            Ok(()) => config.setpoints,
            Err(e) => {
                warn!("configured setpoints rejected ({e}), using defaults");
                Setpoints::default()
            }
        };

        info!(
            greenhouse = %greenhouse_id,
            interval_s = config.telemetry.interval_secs,
            "greenhouse controller ready"
        );

        Self {
            sensors,
            actuators,
            rules: ControlRules::new(setpoints, now),
            publisher: TelemetryPublisher::new(greenhouse_id, config.telemetry.aggregation),
            monitor: ConnectionMonitor::new(config.mqtt.reconnect_interval()),
            flusher: FlushController::new(config.telemetry.flush_delay()),
            clock: TimestampSource::new(),
            transport,
            setpoint_topic: topic,
            interval: config.telemetry.interval(),
            last_cycle: None,
            latest: None,
        }
    }

    /// One loop iteration. Returns the publish outcome when a sample cycle ran.
    pub fn step(&mut self, now: Instant) -> Option<PublishOutcome> {
        for message in self.transport.poll() {
            self.handle_message(message);
        }

        if let TickOutcome::Connected { flushed } =
            self.monitor
                .tick(now, &mut self.publisher, &mut self.transport, &self.flusher)
        {
            debug!(flushed, "reconnection handled");
        }
        // Single connectivity snapshot per step
        let connected = self.monitor.is_connected();

        let due = self
            .last_cycle
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        let sample = if due {
            self.last_cycle = Some(now);
            let sample = self.sample();
            self.latest = Some(sample);
            sample
        } else {
            self.latest?
        };

        self.rules.evaluate(
            now,
            sample.temperature,
            sample.humidity,
            sample.tank_level,
            &mut self.actuators,
        );

        if !due {
            return None;
        }
        self.log_status(now, &sample);
        Some(self.publish(sample, connected))
    }

    fn handle_message(&mut self, message: InboundMessage) {
        if message.topic != self.setpoint_topic {
            debug!(topic = %message.topic, "ignoring message on unexpected topic");
            return;
        }
        match Setpoints::from_message(&message.payload) {
            Ok(setpoints) => self.rules.apply_setpoints(setpoints),
            Err(e) => warn!("setpoint update discarded: {e}"),
        }
    }

    fn sample(&mut self) -> Sample {
        let sample = Sample {
            temperature: self.sensors.temperature.read_value(),
            humidity: self.sensors.humidity.read_value(),
            light: self.sensors.light.read_value(),
            tank_level: self.sensors.tank.is_water_ok(),
        };

        if sample.temperature.is_none() || sample.humidity.is_none() || sample.light.is_none() {
            warn!(
                temperature = sample.temperature.is_some(),
                humidity = sample.humidity.is_some(),
                light = sample.light.is_some(),
                "sensor read failed"
            );
        }
        sample
    }

    fn log_status(&self, now: Instant, sample: &Sample) {
        let (irrigating, irrigation_remaining_s) = match self.rules.irrigation_status(now) {
            IrrigationStatus::Irrigating { remaining } => (true, remaining.as_secs()),
            IrrigationStatus::Waiting { remaining } => (false, remaining.as_secs()),
        };
        info!(
            temperature = ?sample.temperature,
            humidity = ?sample.humidity,
            light = ?sample.light,
            tank = sample.tank_level,
            heater = self.actuators.heater.is_on(),
            fan = self.actuators.fan.is_on(),
            irrigating,
            irrigation_remaining_s,
            buffered = self.publisher.buffered_count(),
            "status"
        );
    }

    fn publish(&mut self, sample: Sample, connected: bool) -> PublishOutcome {
        let reading = Reading {
            timestamp: self.clock.now(),
            temperature: sample.temperature,
            humidity: sample.humidity,
            light: sample.light,
            tank_level: sample.tank_level,
            pump_on: self.actuators.pump.is_on(),
            lights_on: self.actuators.lights.is_on(),
            irrigated: self.rules.take_irrigated_flag(),
        };
        self.publisher.publish(reading, connected, &mut self.transport)
    }

    pub fn setpoints(&self) -> &Setpoints {
        self.rules.setpoints()
    }

    pub fn publisher(&self) -> &TelemetryPublisher {
        &self.publisher
    }

    pub fn actuators(&self) -> &Actuators {
        &self.actuators
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
