//! SimGpioDriver: a software GPIO bank with a switch matrix wired across its pins.
//!
//! Output writes, direction changes and switch presses all re-settle the electrical
//! levels of the bank and latch edges on input pins, so scanning and edge-driven code
//! can run against it exactly as it would against a real port.
use crate::{
    GpioActiveLevel, GpioBias, GpioBus, GpioBusInput, GpioBusOutput, GpioDriver, GpioEdge,
    GpioEdgeSource, GpioError, GpioInput, GpioOutput, GpioPin, GpioResult,
};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU8;
use std::sync::{Mutex, MutexGuard};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
enum SimDirection {
    #[default] Unconfigured,
    Input,
    Output,
}

#[derive(Clone, Debug, Default)]
struct SimPinState {
    direction: SimDirection,
    /// Electrical level driven while the pin is an output.
    latch: bool,
    bias: GpioBias,
    forced: Option<bool>,
    /// Current electrical level.
    level: bool,
    rising: bool,
    falling: bool,
}

#[derive(Debug, Default)]
struct SimState {
    pins: Vec<SimPinState>,
    switches: Vec<(usize, usize)>,
}

impl SimState {
    fn sensed_level(&self, index: usize) -> bool {
        let pin = &self.pins[index];
        if pin.direction == SimDirection::Output {
            return pin.latch;
        }
        if let Some(level) = pin.forced {
            return level;
        }

        let driven: Vec<bool> = self
            .switches
            .iter()
            .filter_map(|&(a, b)| {
                if a == index {
                    Some(b)
                } else if b == index {
                    Some(a)
                } else {
                    None
                }
            })
            .filter(|&other| self.pins[other].direction == SimDirection::Output)
            .map(|other| self.pins[other].latch)
            .collect();

        if driven.is_empty() {
            pin.bias == GpioBias::PullUp
        } else if pin.bias == GpioBias::PullUp {
            // Any closed switch to a low output sinks the pull-up.
            driven.iter().all(|&level| level)
        } else {
            driven.iter().any(|&level| level)
        }
    }

    fn settle(&mut self) {
        let levels: Vec<bool> = (0..self.pins.len()).map(|i| self.sensed_level(i)).collect();

        for (pin, level) in self.pins.iter_mut().zip(levels) {
            if pin.direction == SimDirection::Input && pin.level != level {
                if level {
                    pin.rising = true;
                } else {
                    pin.falling = true;
                }
            }
            pin.level = level;
        }
    }
}

/// A simulated GPIO bank, addressed by pin index like any other [GpioDriver].
pub struct SimGpioDriver {
    name: String,
    state: Mutex<SimState>,
    used_pins: BitVec<AtomicU8>,
}

impl SimGpioDriver {
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        let mut state = SimState {
            pins: vec![SimPinState::default(); count],
            switches: Vec::new(),
        };
        state.settle();

        Self {
            name: name.into(),
            state: Mutex::new(state),
            used_pins: BitVec::repeat(false, count),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> GpioResult<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| GpioError::Other(format!("{} state poisoned", self.name)))
    }

    fn check_index(&self, index: usize) -> GpioResult<()> {
        if index >= self.used_pins.len() {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    /// Closes the switch between two pins, like pressing a key at their intersection.
    pub fn press(&self, a: usize, b: usize) -> GpioResult<()> {
        self.check_index(a)?;
        self.check_index(b)?;
        if a == b {
            return Err(GpioError::InvalidArgument);
        }

        let mut state = self.state()?;
        if !state.switches.iter().any(|&s| s == (a, b) || s == (b, a)) {
            state.switches.push((a, b));
        }
        trace!("{}: switch {}-{} closed", self.name, a, b);
        state.settle();
        Ok(())
    }

    /// Opens the switch between two pins.
    pub fn release(&self, a: usize, b: usize) -> GpioResult<()> {
        self.check_index(a)?;
        self.check_index(b)?;

        let mut state = self.state()?;
        state.switches.retain(|&s| s != (a, b) && s != (b, a));
        trace!("{}: switch {}-{} open", self.name, a, b);
        state.settle();
        Ok(())
    }

    pub fn release_all(&self) -> GpioResult<()> {
        let mut state = self.state()?;
        state.switches.clear();
        state.settle();
        Ok(())
    }

    /// Forces the electrical level seen on a non-output pin. `None` removes the override.
    pub fn set_input_level(&self, index: usize, level: Option<bool>) -> GpioResult<()> {
        self.check_index(index)?;

        let mut state = self.state()?;
        state.pins[index].forced = level;
        state.settle();
        Ok(())
    }

    /// Gets the electrical level of a pin.
    pub fn level(&self, index: usize) -> GpioResult<bool> {
        self.check_index(index)?;
        Ok(self.state()?.pins[index].level)
    }

    pub fn is_output(&self, index: usize) -> GpioResult<bool> {
        self.check_index(index)?;
        Ok(self.state()?.pins[index].direction == SimDirection::Output)
    }

    pub fn is_input(&self, index: usize) -> GpioResult<bool> {
        self.check_index(index)?;
        Ok(self.state()?.pins[index].direction == SimDirection::Input)
    }

    fn configure(&self, indices: &[usize], direction: SimDirection, bias: GpioBias) -> GpioResult<()> {
        let mut state = self.state()?;
        for &index in indices {
            let pin = &mut state.pins[index];
            pin.direction = direction;
            pin.bias = bias;
        }
        state.settle();
        Ok(())
    }

    fn drive(&self, indices: &[usize], levels: &[bool]) -> GpioResult<()> {
        let mut state = self.state()?;
        for (&index, &level) in indices.iter().zip(levels) {
            let pin = &mut state.pins[index];
            if pin.direction != SimDirection::Output {
                return Err(GpioError::Other(format!("{}[{}] is not an output", self.name, index)));
            }
            pin.latch = level;
        }
        state.settle();
        Ok(())
    }

    fn sense(&self, index: usize) -> GpioResult<bool> {
        Ok(self.state()?.pins[index].level)
    }
}

impl Debug for SimGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimGpioDriver({})", self.name)
    }
}

impl GpioDriver for SimGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.used_pins.len())
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        self.check_index(index)?;

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_pins.set_aliased(index, true);

        Ok(Box::new(SimPin {
            driver: self,
            pin_index: index,
            active_level: GpioActiveLevel::High,
            bias: GpioBias::None,
        }))
    }

    fn get_pin_bus<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioBus<N> + '_>> {
        let n = self.count()?;

        if indices.iter().any(|&index| index >= n) {
            return Err(GpioError::InvalidArgument);
        }

        for (i, index) in indices.iter().enumerate() {
            if indices[..i].contains(index) {
                return Err(GpioError::InvalidArgument);
            }
        }

        if indices.iter().any(|&index| self.used_pins[index]) {
            return Err(GpioError::AlreadyInUse);
        }

        for index in indices {
            self.used_pins.set_aliased(index, true);
        }

        Ok(Box::new(SimBus {
            driver: self,
            pin_indices: indices,
            active_level: GpioActiveLevel::High,
            bias: GpioBias::None,
        }))
    }
}

impl GpioEdgeSource for SimGpioDriver {
    fn edge_pending(&self, pin: usize, edge: GpioEdge) -> GpioResult<bool> {
        self.check_index(pin)?;

        let state = self.state()?;
        let pin = &state.pins[pin];
        Ok(match edge {
            GpioEdge::Rising => pin.rising,
            GpioEdge::Falling => pin.falling,
            GpioEdge::Both => pin.rising || pin.falling,
        })
    }

    fn clear_edges(&self, pin: usize) -> GpioResult<()> {
        self.check_index(pin)?;

        let mut state = self.state()?;
        let pin = &mut state.pins[pin];
        pin.rising = false;
        pin.falling = false;
        Ok(())
    }
}

struct SimPin<'a> {
    driver: &'a SimGpioDriver,
    pin_index: usize,
    active_level: GpioActiveLevel,
    bias: GpioBias,
}

impl Debug for SimPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for SimPin<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        self.driver.configure(&[self.pin_index], SimDirection::Input, self.bias)?;
        Ok(Box::new(SimInput { pin: self }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        self.driver.configure(&[self.pin_index], SimDirection::Output, self.bias)?;
        Ok(Box::new(SimOutput { pin: self }))
    }

    fn supports_active_level(&self) -> bool {
        true
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.active_level = level;
        Ok(())
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.bias = bias;
        Ok(())
    }
}

impl Drop for SimPin<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

struct SimInput<'a> {
    pin: &'a SimPin<'a>,
}

impl Debug for SimInput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][input]", self.pin.driver, self.pin.pin_index)
    }
}

impl GpioInput for SimInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        let level = self.pin.driver.sense(self.pin.pin_index)?;
        Ok(self.pin.active_level.get_state(level))
    }
}

struct SimOutput<'a> {
    pin: &'a SimPin<'a>,
}

impl Debug for SimOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.pin.driver, self.pin.pin_index)
    }
}

impl GpioOutput for SimOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        let level = self.pin.active_level.get_state(value);
        self.pin.driver.drive(&[self.pin.pin_index], &[level])
    }
}

struct SimBus<'a, const N: usize> {
    driver: &'a SimGpioDriver,
    pin_indices: [usize; N],
    active_level: GpioActiveLevel,
    bias: GpioBias,
}

impl<const N: usize> Debug for SimBus<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.pin_indices)
    }
}

impl<const N: usize> GpioBus<N> for SimBus<'_, N> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioBusInput<N> + '_>> {
        self.driver.configure(&self.pin_indices, SimDirection::Input, self.bias)?;
        Ok(Box::new(SimBusInput { bus: self }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        self.driver.configure(&self.pin_indices, SimDirection::Output, self.bias)?;
        Ok(Box::new(SimBusOutput { bus: self }))
    }

    fn supports_active_level(&self) -> bool {
        true
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.active_level = level;
        Ok(())
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.bias = bias;
        Ok(())
    }
}

impl<const N: usize> Drop for SimBus<'_, N> {
    fn drop(&mut self) {
        for &index in &self.pin_indices {
            self.driver.used_pins.set_aliased(index, false);
        }
    }
}

struct SimBusInput<'a, const N: usize> {
    bus: &'a SimBus<'a, N>,
}

impl<const N: usize> Debug for SimBusInput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}[input]", self.bus.driver, self.bus.pin_indices)
    }
}

impl<const N: usize> GpioBusInput<N> for SimBusInput<'_, N> {
    fn read(&self) -> GpioResult<[bool; N]> {
        let mut values = [false; N];
        for (i, &index) in self.bus.pin_indices.iter().enumerate() {
            let level = self.bus.driver.sense(index)?;
            values[i] = self.bus.active_level.get_state(level);
        }
        Ok(values)
    }
}

struct SimBusOutput<'a, const N: usize> {
    bus: &'a SimBus<'a, N>,
}

impl<const N: usize> Debug for SimBusOutput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}[output]", self.bus.driver, self.bus.pin_indices)
    }
}

impl<const N: usize> GpioBusOutput<N> for SimBusOutput<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        let mut levels = [false; N];
        for (i, &value) in values.iter().enumerate() {
            levels[i] = self.bus.active_level.get_state(value);
        }
        self.bus.driver.drive(&self.bus.pin_indices, &levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claimed_pins_are_exclusive_until_dropped() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let bus = gpio.get_pin_bus([0, 1, 2]).unwrap();
        assert_eq!(gpio.get_pin(1).unwrap_err(), GpioError::AlreadyInUse);
        assert_eq!(gpio.get_pin_bus([2, 3]).unwrap_err(), GpioError::AlreadyInUse);
        drop(bus);
        assert!(gpio.get_pin(1).is_ok());
    }

    #[test]
    fn out_of_range_or_repeated_pins_are_invalid() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        assert_eq!(gpio.get_pin(8).unwrap_err(), GpioError::InvalidArgument);
        assert_eq!(gpio.get_pin_bus([6, 7, 8]).unwrap_err(), GpioError::InvalidArgument);
        assert_eq!(gpio.get_pin_bus([3, 3]).unwrap_err(), GpioError::InvalidArgument);
        assert_eq!(gpio.press(0, 9), Err(GpioError::InvalidArgument));
    }

    #[test]
    fn closed_switch_carries_output_level_to_input() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut out_pin = gpio.get_pin(4).unwrap();
        let mut in_pin = gpio.get_pin(0).unwrap();
        let out = out_pin.as_output().unwrap();
        let input = in_pin.as_input().unwrap();

        out.write(true).unwrap();
        assert!(!input.read().unwrap());

        gpio.press(0, 4).unwrap();
        assert!(input.read().unwrap());
        assert!(gpio.edge_pending(0, GpioEdge::Rising).unwrap());
        assert!(!gpio.edge_pending(0, GpioEdge::Falling).unwrap());

        out.write(false).unwrap();
        assert!(!input.read().unwrap());
        assert!(gpio.edge_pending(0, GpioEdge::Falling).unwrap());

        gpio.clear_edges(0).unwrap();
        assert!(!gpio.edge_pending(0, GpioEdge::Both).unwrap());
    }

    #[test]
    fn pull_up_input_is_sunk_by_low_output() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut out_pin = gpio.get_pin(4).unwrap();
        let mut in_pin = gpio.get_pin(0).unwrap();
        in_pin.set_bias(GpioBias::PullUp).unwrap();
        in_pin.set_active_level(GpioActiveLevel::Low).unwrap();
        let out = out_pin.as_output().unwrap();
        let input = in_pin.as_input().unwrap();

        out.write(true).unwrap();
        gpio.press(0, 4).unwrap();
        assert!(!input.read().unwrap());

        out.write(false).unwrap();
        assert!(input.read().unwrap());
        assert!(!gpio.level(0).unwrap());
    }

    #[test]
    fn forced_level_overrides_switches() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut in_pin = gpio.get_pin(2).unwrap();
        let input = in_pin.as_input().unwrap();

        gpio.set_input_level(2, Some(true)).unwrap();
        assert!(input.read().unwrap());
        gpio.set_input_level(2, None).unwrap();
        assert!(!input.read().unwrap());
    }

    #[test]
    fn writing_a_non_output_fails() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut bus = gpio.get_pin_bus([0, 1]).unwrap();
        let input = bus.as_input().unwrap();
        drop(input);
        assert!(gpio.is_input(0).unwrap());
        assert!(gpio.drive(&[0], &[true]).is_err());
    }
}
