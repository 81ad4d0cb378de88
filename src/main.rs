//! # Greenhouse Controller Entry Point
//!
//! Loads the configuration, sets up logging and the transport, then runs the
//! control loop forever on the main thread.
//!
//! ## Modes
//! - default: MQTT through rumqttc, its network event loop on a tokio runtime
//! - `--stdout`: no broker; every payload is printed to stdout instead
//!
//! Sensors are simulated unless the binary is built with `--features hardware`
//! on Linux. Then relays and the tank switch use the configured GPIO pins, and
//! the climate sensors report unavailable until they get a driver.

// Test modules
#[cfg(test)]
mod tests;

use anyhow::Context;
use greenhouse_lib::config::Config;
use greenhouse_lib::control::Actuators;
use greenhouse_lib::controller::{Greenhouse, Sensors};
use greenhouse_lib::transport::{MemoryTransport, MqttTransport, Transport};
use std::env;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line options.
#[derive(Debug, Default)]
struct Args {
    config_path: Option<String>,
    development_mode: bool,
    write_default_config: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config_path = Some(iter.next().context("--config needs a path")?);
            }
            "--stdout" => args.development_mode = true,
            "--write-default-config" => args.write_default_config = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

fn init_logging(level: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
fn build_hardware(config: &Config) -> anyhow::Result<(Sensors, Actuators)> {
    use greenhouse_lib::hardware::gpio::{GpioRelay, GpioTankSwitch};
    use greenhouse_lib::hardware::UnavailableSensor;
    use rppal::gpio::Gpio;
    use tracing::warn;

    let gpio = Gpio::new().context("open GPIO")?;
    let pins = &config.hardware;
    info!(
        pump = pins.pump_pin,
        heater = pins.heater_pin,
        fan = pins.fan_pin,
        lights = pins.lights_pin,
        tank = pins.tank_pin,
        "GPIO pin configuration"
    );

    let actuators = Actuators {
        pump: Box::new(GpioRelay::new(&gpio, pins.pump_pin, "pump")?),
        heater: Box::new(GpioRelay::new(&gpio, pins.heater_pin, "heater")?),
        fan: Box::new(GpioRelay::new(&gpio, pins.fan_pin, "fan")?),
        lights: Box::new(GpioRelay::new(&gpio, pins.lights_pin, "lights")?),
    };

    // No DHT11 or VCNL4010 driver, so these never produce a value
    warn!("temperature, humidity and light sensors have no driver, reporting them unavailable");
    let sensors = Sensors {
        temperature: Box::new(UnavailableSensor::temperature()),
        humidity: Box::new(UnavailableSensor::humidity()),
        light: Box::new(UnavailableSensor::light()),
        tank: Box::new(GpioTankSwitch::new(&gpio, pins.tank_pin)?),
    };
    Ok((sensors, actuators))
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
fn build_hardware(_config: &Config) -> anyhow::Result<(Sensors, Actuators)> {
    info!("hardware support not enabled, using simulated sensors and relays");
    Ok((Sensors::simulated(), Actuators::simulated()))
}

fn run<T: Transport>(mut greenhouse: Greenhouse<T>, config: &Config) -> ! {
    let loop_delay = config.telemetry.loop_delay();
    loop {
        greenhouse.step(Instant::now());
        std::thread::sleep(loop_delay);
    }
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let config = match &args.config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    init_logging(&config.logging.level);

    if args.write_default_config {
        match &args.config_path {
            Some(path) => Config::default().save_to_path(path)?,
            None => Config::default().save()?,
        }
        return Ok(());
    }

    let (sensors, actuators) = build_hardware(&config)?;

    // Development mode: no broker, payloads go to stdout
    if args.development_mode {
        info!("development mode, printing telemetry to stdout");
        let transport = MemoryTransport::new(true).with_echo().with_auto_reconnect();
        let greenhouse = Greenhouse::new(&config, sensors, actuators, transport, Instant::now());
        run(greenhouse, &config);
    }

    // Create Tokio runtime for the MQTT network event loop
    let rt = tokio::runtime::Runtime::new()?;
    let transport = MqttTransport::spawn(rt.handle(), &config.mqtt, &config.device.client_id);
    let greenhouse = Greenhouse::new(&config, sensors, actuators, transport, Instant::now());
    run(greenhouse, &config)
}
