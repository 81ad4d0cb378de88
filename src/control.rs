//! # Threshold Control Rules
//!
//! Simple bang-bang rules run once per sample cycle:
//!
//! - **Fan**: on while humidity is above `target_hum_air_max` *or* temperature
//!   is above `target_temp_max`
//! - **Heater**: on below `target_temp_min`, off at `target_temp_max`, left as
//!   is in between (hysteresis)
//! - **Pump**: every `irrigation_interval_minutes` run for
//!   `irrigation_duration_seconds`, skipped when the tank is empty
//! - **Grow lights**: manual, never switched here
//!
//! Unavailable readings never switch anything.

use crate::hardware::Actuator;
use crate::setpoints::Setpoints;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The four relays the rules drive.
pub struct Actuators {
    pub pump: Box<dyn Actuator>,
    pub heater: Box<dyn Actuator>,
    pub fan: Box<dyn Actuator>,
    pub lights: Box<dyn Actuator>,
}

/// Where the irrigation timer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrrigationStatus {
    /// Pump running; time until it stops
    Irrigating { remaining: Duration },
    /// Pump idle; time until the next start
    Waiting { remaining: Duration },
}

/// Threshold evaluator plus the irrigation cycle state.
#[derive(Debug)]
pub struct ControlRules {
    setpoints: Setpoints,
    cycle_started: Instant,
    irrigating: bool,
    irrigated_since_last_transmission: bool,
}

impl ControlRules {
    /// Start the irrigation timer at `now`.
    pub fn new(setpoints: Setpoints, now: Instant) -> Self {
        Self {
            setpoints,
            cycle_started: now,
            irrigating: false,
            irrigated_since_last_transmission: false,
        }
    }

    pub fn setpoints(&self) -> &Setpoints {
        &self.setpoints
    }

    /// Replace the active setpoints. The running irrigation cycle keeps its start time.
    pub fn apply_setpoints(&mut self, setpoints: Setpoints) {
        info!(
            temp_min = setpoints.target_temp_min,
            temp_max = setpoints.target_temp_max,
            hum_max = setpoints.target_hum_air_max,
            light = setpoints.target_light_intensity,
            interval_min = setpoints.irrigation_interval_minutes,
            duration_s = setpoints.irrigation_duration_seconds,
            "setpoints updated"
        );
        self.setpoints = setpoints;
    }

    /// Run every rule against the latest readings.
    pub fn evaluate(
        &mut self,
        now: Instant,
        temperature: Option<f32>,
        humidity: Option<f32>,
        tank_has_water: bool,
        actuators: &mut Actuators,
    ) {
        self.control_fan(temperature, humidity, actuators.fan.as_mut());
        self.control_heater(temperature, actuators.heater.as_mut());
        self.control_pump(now, tank_has_water, actuators.pump.as_mut());
    }

    /// True if an irrigation finished since the last call; resets the flag.
    pub fn take_irrigated_flag(&mut self) -> bool {
        std::mem::take(&mut self.irrigated_since_last_transmission)
    }

    pub fn irrigation_status(&self, now: Instant) -> IrrigationStatus {
        let elapsed = now.saturating_duration_since(self.cycle_started);
        if self.irrigating {
            IrrigationStatus::Irrigating {
                remaining: self.setpoints.irrigation_duration().saturating_sub(elapsed),
            }
        } else {
            IrrigationStatus::Waiting {
                remaining: self.setpoints.irrigation_interval().saturating_sub(elapsed),
            }
        }
    }

    fn control_fan(&self, temperature: Option<f32>, humidity: Option<f32>, fan: &mut dyn Actuator) {
        let too_humid = humidity.is_some_and(|h| h > self.setpoints.target_hum_air_max);
        let too_hot = temperature.is_some_and(|t| t > self.setpoints.target_temp_max);
        fan.set(too_humid || too_hot);
    }

    fn control_heater(&self, temperature: Option<f32>, heater: &mut dyn Actuator) {
        let Some(t) = temperature else {
            return;
        };
        if t < self.setpoints.target_temp_min {
            heater.set(true);
        } else if t >= self.setpoints.target_temp_max {
            heater.set(false);
        }
    }

    fn control_pump(&mut self, now: Instant, tank_has_water: bool, pump: &mut dyn Actuator) {
        let elapsed = now.saturating_duration_since(self.cycle_started);

        if self.irrigating {
            if elapsed >= self.setpoints.irrigation_duration() {
                pump.turn_off();
                self.irrigating = false;
                self.irrigated_since_last_transmission = true;
                info!("irrigation cycle completed");
            }
            return;
        }

        if elapsed >= self.setpoints.irrigation_interval() {
            // Either way the next interval counts from now
            self.cycle_started = now;
            if tank_has_water {
                pump.turn_on();
                self.irrigating = true;
                info!(
                    duration_s = self.setpoints.irrigation_duration_seconds,
                    "starting irrigation"
                );
            } else {
                warn!("irrigation skipped, tank empty");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Relay;

    fn actuators() -> Actuators {
        Actuators {
            pump: Box::new(Relay::new("pump")),
            heater: Box::new(Relay::new("heater")),
            fan: Box::new(Relay::new("fan")),
            lights: Box::new(Relay::new("lights")),
        }
    }

    #[test]
    fn fan_follows_humidity_or_temperature() {
        let start = Instant::now();
        let mut rules = ControlRules::new(Setpoints::default(), start);
        let mut relays = actuators();

        rules.evaluate(start, Some(23.0), Some(75.0), true, &mut relays);
        assert!(relays.fan.is_on());

        rules.evaluate(start, Some(25.0), Some(50.0), true, &mut relays);
        assert!(relays.fan.is_on());

        rules.evaluate(start, Some(23.0), Some(50.0), true, &mut relays);
        assert!(!relays.fan.is_on());

        // Missing data never turns the fan on
        rules.evaluate(start, None, None, true, &mut relays);
        assert!(!relays.fan.is_on());
    }

    #[test]
    fn heater_has_hysteresis() {
        let start = Instant::now();
        let mut rules = ControlRules::new(Setpoints::default(), start);
        let mut relays = actuators();

        rules.evaluate(start, Some(20.0), None, true, &mut relays);
        assert!(relays.heater.is_on());

        // Between min and max: keep heating
        rules.evaluate(start, Some(23.0), None, true, &mut relays);
        assert!(relays.heater.is_on());

        rules.evaluate(start, Some(24.0), None, true, &mut relays);
        assert!(!relays.heater.is_on());

        // Sensor failure leaves the heater alone
        relays.heater.turn_on();
        rules.evaluate(start, None, None, true, &mut relays);
        assert!(relays.heater.is_on());
    }

    #[test]
    fn irrigation_cycle_sets_flag_once() {
        let start = Instant::now();
        let mut rules = ControlRules::new(Setpoints::default(), start);
        let mut relays = actuators();

        // Interval (1 min) elapsed: start pumping
        let t1 = start + Duration::from_secs(60);
        rules.evaluate(t1, None, None, true, &mut relays);
        assert!(relays.pump.is_on());
        assert!(!rules.take_irrigated_flag());
        assert_eq!(
            rules.irrigation_status(t1 + Duration::from_secs(5)),
            IrrigationStatus::Irrigating {
                remaining: Duration::from_secs(15)
            }
        );

        // Duration (20 s) elapsed: stop and report
        let t2 = t1 + Duration::from_secs(20);
        rules.evaluate(t2, None, None, true, &mut relays);
        assert!(!relays.pump.is_on());
        assert!(rules.take_irrigated_flag());
        assert!(!rules.take_irrigated_flag());
    }

    #[test]
    fn empty_tank_skips_irrigation_and_restarts_timer() {
        let start = Instant::now();
        let mut rules = ControlRules::new(Setpoints::default(), start);
        let mut relays = actuators();

        let t1 = start + Duration::from_secs(61);
        rules.evaluate(t1, None, None, false, &mut relays);
        assert!(!relays.pump.is_on());
        assert_eq!(
            rules.irrigation_status(t1),
            IrrigationStatus::Waiting {
                remaining: Duration::from_secs(60)
            }
        );

        // Water is back but the interval restarted at t1
        rules.evaluate(t1 + Duration::from_secs(30), None, None, true, &mut relays);
        assert!(!relays.pump.is_on());
    }

    #[test]
    fn lights_are_never_switched() {
        let start = Instant::now();
        let mut rules = ControlRules::new(Setpoints::default(), start);
        let mut relays = actuators();
        relays.lights.turn_on();

        rules.evaluate(start, Some(30.0), Some(90.0), true, &mut relays);
        assert!(relays.lights.is_on());
    }
}
