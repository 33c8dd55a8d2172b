mod config;

use std::env::var;
use std::io::{BufRead, stdin};
use dotenv::dotenv;
use log::{debug, info, warn};
use padscan_gpio::GpioDriver;
use padscan_gpio::irq::EdgeDispatcher;
use padscan_gpio::keypad::{GpioKeypad, KeypadKey, RgbIndicator};
use padscan_gpio::sim::SimGpioDriver;
use sysinfo::System;
use crate::config::Config;

fn parse_pin_bus<const N: usize>(pin_str: &str) -> eyre::Result<[usize; N]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|_| eyre::eyre!("Expected {} pins", N))
}

fn pins_from_env<const N: usize>(name: &str, fallback: [usize; N]) -> eyre::Result<[usize; N]> {
    match var(name) {
        Ok(pin_str) => parse_pin_bus(&pin_str),
        Err(_) => Ok(fallback),
    }
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "padscan starting on {} ({})",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::cpu_arch(),
    );

    debug!("Trying to load config...");
    let mut config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };

    config.keypad_cols = pins_from_env("PADSCAN_KEYPAD_PINS_COLS", config.keypad_cols)?;
    config.keypad_rows = pins_from_env("PADSCAN_KEYPAD_PINS_ROWS", config.keypad_rows)?;
    config.led_pins = pins_from_env("PADSCAN_LED_PINS", config.led_pins)?;

    let pins = config.keypad_pins();
    info!("Keypad @ {} Cols: {:?}, Rows: {:?}, active {:?}",
        config.keypad_port, pins.cols, pins.rows, pins.active_level);
    info!("LED @ {} {:?}", config.led_port, config.led_pins);

    debug!("Initializing GPIO ports...");
    let keypad_port = SimGpioDriver::new(config.keypad_port.as_str(), config.keypad_port_pins);
    let led_port = SimGpioDriver::new(config.led_port.as_str(), config.led_port_pins);

    let mut led_bus = led_port.get_pin_bus(config.led_pins)?;
    let led = RgbIndicator::bind(&mut *led_bus)?;

    debug!("Initializing keypad driver...");
    let mut keypad_buses = pins.claim(&keypad_port)?;
    let keypad = GpioKeypad::bind(&mut keypad_buses)?.with_indicator(led);
    debug!("{:?} initialized.", keypad);

    let mut irq = EdgeDispatcher::new(&keypad_port);
    let handler = irq.register(&pins.rows, pins.press_edge(), || keypad.on_key_edge());
    irq.enable(handler)?;
    irq.set_global_enable(true);
    debug!("{:?} ready.", irq);

    info!("Type keys (0-9, *, #) and press enter. Close input to quit.");

    for line in stdin().lock().lines() {
        let line = line?;
        for c in line.chars().filter(|c| !c.is_whitespace()) {
            let Some(key) = KeypadKey::from_char(c) else {
                warn!("No key labelled {:?} on the keypad.", c);
                continue;
            };

            let (row, col) = pins.switch_for(key);
            keypad_port.press(row, col)?;
            let handled = irq.dispatch()?;
            keypad_port.release(row, col)?;
            irq.dispatch()?;

            let last_pressed = keypad.last_pressed();
            let led_on = led_port.level(config.led_pins[2])?;
            info!(
                "{} -> {} handler(s), last pressed {:?} (code {}), LED {}",
                key,
                handled,
                last_pressed,
                last_pressed.legacy_code(),
                if led_on { "green" } else { "off" },
            );
        }
    }

    info!("Input closed, exiting.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_lists_accept_mixed_separators() {
        assert_eq!(parse_pin_bus::<3>("4, 5;6").unwrap(), [4, 5, 6]);
        assert_eq!(parse_pin_bus::<4>(" 0 1 2 3 ").unwrap(), [0, 1, 2, 3]);
    }

    #[test]
    fn pin_lists_must_have_the_right_length() {
        assert!(parse_pin_bus::<3>("4,5").is_err());
        assert!(parse_pin_bus::<3>("4,5,x").is_err());
    }
}
