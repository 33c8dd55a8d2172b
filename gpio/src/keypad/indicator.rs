use std::fmt::{Debug, Formatter};
use crate::{GpioBus, GpioBusOutput, GpioResult};

/// What an indicator shows after an edge has been handled.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum IndicatorState {
    #[default]
    Off,
    /// A numeric key was found.
    KeyDetected,
}

/// An output that reflects the result of the last handled edge.
pub trait Indicator: Debug {
    fn show(&self, state: IndicatorState) -> GpioResult<()>;
}

/// An RGB LED on three pins, in (red, blue, green) order.
pub struct RgbIndicator<'a> {
    led: Box<dyn GpioBusOutput<3> + 'a>,
}

impl<'a> RgbIndicator<'a> {
    pub const RED: u32 = 0b001;
    pub const BLUE: u32 = 0b010;
    pub const GREEN: u32 = 0b100;

    /// Configures the bus as outputs and turns the LED off.
    pub fn bind(bus: &'a mut dyn GpioBus<3>) -> GpioResult<Self> {
        let led = bus.as_output()?;
        led.write_mask(0)?;
        Ok(RgbIndicator { led })
    }
}

impl Debug for RgbIndicator<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RgbIndicator({:?})", self.led)
    }
}

impl Indicator for RgbIndicator<'_> {
    fn show(&self, state: IndicatorState) -> GpioResult<()> {
        match state {
            IndicatorState::Off => self.led.write_mask(0),
            IndicatorState::KeyDetected => self.led.write_mask(Self::GREEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpioDriver;
    use crate::sim::SimGpioDriver;

    #[test]
    fn key_detected_is_green_only() {
        let gpio = SimGpioDriver::new("PORTF", 4);
        let mut bus = gpio.get_pin_bus([1, 2, 3]).unwrap();
        let led = RgbIndicator::bind(&mut *bus).unwrap();

        led.show(IndicatorState::KeyDetected).unwrap();
        assert!(!gpio.level(1).unwrap());
        assert!(!gpio.level(2).unwrap());
        assert!(gpio.level(3).unwrap());

        led.show(IndicatorState::Off).unwrap();
        assert!(!gpio.level(3).unwrap());
    }
}
