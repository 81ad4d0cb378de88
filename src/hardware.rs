//! # Sensors and Actuators
//!
//! Hardware sits behind three small traits so the controller never cares
//! whether it drives real relays or the simulated bench setup.
//!
//! ## Error Sentinels
//! A [`Sensor`] reports a failed read by returning its sentinel value (for
//! example `-999.0` for the temperature probe). [`Sensor::read_value`] turns
//! that into `None` right at the boundary, so the sentinel never travels
//! further into the pipeline.
//!
//! ## Implementations
//! - [`SimulatedSensor`], [`SimulatedTank`], [`Relay`]: mock hardware for
//!   development and tests
//! - [`UnavailableSensor`]: placeholder for a probe with no driver; always
//!   reports failure so the rules never act on made-up values
//! - `gpio::GpioRelay`, `gpio::GpioTankSwitch`: Raspberry Pi GPIO through
//!   rppal (`hardware` feature, Linux only)

use crate::{SENSOR_ERROR_HUM, SENSOR_ERROR_LIGHT, SENSOR_ERROR_TEMP};
use tracing::debug;

/// Scalar sensor with a reserved error value.
pub trait Sensor {
    /// Raw reading; [`Sensor::sentinel`] when the read failed.
    fn read(&mut self) -> f32;

    /// Value this sensor returns on failure.
    fn sentinel(&self) -> f32;

    /// Reading with the sentinel (and NaN) mapped to `None`.
    fn read_value(&mut self) -> Option<f32> {
        let raw = self.read();
        if raw.is_nan() || raw == self.sentinel() {
            None
        } else {
            Some(raw)
        }
    }
}

/// Float switch in the water tank.
pub trait TankSensor {
    /// True if the tank has water.
    fn is_water_ok(&mut self) -> bool;
}

/// On/off relay output.
pub trait Actuator {
    fn turn_on(&mut self);
    fn turn_off(&mut self);
    fn is_on(&self) -> bool;

    /// Drive the relay to `on`, touching it only when the state changes.
    fn set(&mut self, on: bool) {
        match (on, self.is_on()) {
            (true, false) => self.turn_on(),
            (false, true) => self.turn_off(),
            _ => {}
        }
    }
}

/// Deterministic mock sensor: a slow wave around `base`.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    base: f32,
    spread: f32,
    sentinel: f32,
    step: u32,
    fail_every: Option<u32>,
}

impl SimulatedSensor {
    pub fn new(base: f32, spread: f32, sentinel: f32) -> Self {
        Self {
            base,
            spread,
            sentinel,
            step: 0,
            fail_every: None,
        }
    }

    /// Always reads `value`.
    pub fn constant(value: f32, sentinel: f32) -> Self {
        Self::new(value, 0.0, sentinel)
    }

    /// 19-25 °C, like a DHT11 on a mild day.
    pub fn temperature() -> Self {
        Self::new(22.0, 3.0, SENSOR_ERROR_TEMP)
    }

    pub fn humidity() -> Self {
        Self::new(60.0, 15.0, SENSOR_ERROR_HUM)
    }

    pub fn light() -> Self {
        Self::new(500.0, 300.0, SENSOR_ERROR_LIGHT)
    }

    /// Fail every `n`th read (the `n`th, `2n`th, ...).
    pub fn with_failure_every(mut self, n: u32) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }
}

impl Sensor for SimulatedSensor {
    fn read(&mut self) -> f32 {
        self.step = self.step.wrapping_add(1);
        if let Some(n) = self.fail_every {
            if self.step % n == 0 {
                debug!(sentinel = self.sentinel, "simulated sensor failure");
                return self.sentinel;
            }
        }
        self.base + self.spread * (self.step as f32 * 0.7).sin()
    }

    fn sentinel(&self) -> f32 {
        self.sentinel
    }
}

/// Sensor without a driver. Every read returns the sentinel.
#[derive(Debug, Clone, Copy)]
pub struct UnavailableSensor {
    sentinel: f32,
}

impl UnavailableSensor {
    pub fn new(sentinel: f32) -> Self {
        Self { sentinel }
    }

    pub fn temperature() -> Self {
        Self::new(SENSOR_ERROR_TEMP)
    }

    pub fn humidity() -> Self {
        Self::new(SENSOR_ERROR_HUM)
    }

    pub fn light() -> Self {
        Self::new(SENSOR_ERROR_LIGHT)
    }
}

impl Sensor for UnavailableSensor {
    fn read(&mut self) -> f32 {
        self.sentinel
    }

    fn sentinel(&self) -> f32 {
        self.sentinel
    }
}

/// Mock float switch.
#[derive(Debug, Clone)]
pub struct SimulatedTank {
    pub water: bool,
}

impl TankSensor for SimulatedTank {
    fn is_water_ok(&mut self) -> bool {
        self.water
    }
}

/// In-memory relay.
#[derive(Debug, Clone)]
pub struct Relay {
    name: &'static str,
    on: bool,
}

impl Relay {
    /// New relay, switched off.
    pub fn new(name: &'static str) -> Self {
        Self { name, on: false }
    }
}

impl Actuator for Relay {
    fn turn_on(&mut self) {
        self.on = true;
        debug!(relay = self.name, "on");
    }

    fn turn_off(&mut self) {
        self.on = false;
        debug!(relay = self.name, "off");
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

/// Raspberry Pi GPIO relays and tank switch.
#[cfg(all(target_os = "linux", feature = "hardware"))]
pub mod gpio {
    use super::{Actuator, TankSensor};
    use rppal::gpio::{Gpio, InputPin, OutputPin};
    use tracing::debug;

    /// Relay on a BCM GPIO pin, active high.
    pub struct GpioRelay {
        name: &'static str,
        pin: OutputPin,
    }

    impl GpioRelay {
        /// Claim `bcm_pin` as an output and switch the relay off.
        pub fn new(
            gpio: &Gpio,
            bcm_pin: u8,
            name: &'static str,
        ) -> Result<Self, rppal::gpio::Error> {
            let mut pin = gpio.get(bcm_pin)?.into_output();
            pin.set_low();
            Ok(Self { name, pin })
        }
    }

    impl Actuator for GpioRelay {
        fn turn_on(&mut self) {
            self.pin.set_high();
            debug!(relay = self.name, "on");
        }

        fn turn_off(&mut self) {
            self.pin.set_low();
            debug!(relay = self.name, "off");
        }

        fn is_on(&self) -> bool {
            self.pin.is_set_high()
        }
    }

    /// Float switch with internal pull-up; high means liquid detected.
    pub struct GpioTankSwitch {
        pin: InputPin,
    }

    impl GpioTankSwitch {
        pub fn new(gpio: &Gpio, bcm_pin: u8) -> Result<Self, rppal::gpio::Error> {
            Ok(Self {
                pin: gpio.get(bcm_pin)?.into_input_pullup(),
            })
        }
    }

    impl TankSensor for GpioTankSwitch {
        fn is_water_ok(&mut self) -> bool {
            self.pin.is_high()
        }
    }
}
