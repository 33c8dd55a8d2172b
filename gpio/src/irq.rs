use crate::{GpioEdge, GpioEdgeSource, GpioError, GpioResult};
use log::trace;
use std::fmt::{Debug, Formatter};

/// Identifies a handler registered with an [EdgeDispatcher].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct HandlerId(usize);

struct Registration<'a> {
    pins: Vec<usize>,
    edge: GpioEdge,
    enabled: bool,
    handler: Box<dyn FnMut() -> GpioResult<()> + 'a>,
}

/// Routes latched GPIO edges to registered handlers.
///
/// Both the dispatcher and every registration start out disabled, so nothing runs until
/// [enable](EdgeDispatcher::enable) and [set_global_enable](EdgeDispatcher::set_global_enable)
/// have been called. Edges keep latching while disabled and are delivered once enabled.
pub struct EdgeDispatcher<'a> {
    source: &'a dyn GpioEdgeSource,
    registrations: Vec<Registration<'a>>,
    global_enable: bool,
}

impl<'a> EdgeDispatcher<'a> {
    pub fn new(source: &'a dyn GpioEdgeSource) -> Self {
        EdgeDispatcher {
            source,
            registrations: Vec::new(),
            global_enable: false,
        }
    }

    /// Registers a handler for edges of the given kind on any of the pins.
    pub fn register(
        &mut self,
        pins: &[usize],
        edge: GpioEdge,
        handler: impl FnMut() -> GpioResult<()> + 'a,
    ) -> HandlerId {
        self.registrations.push(Registration {
            pins: pins.to_vec(),
            edge,
            enabled: false,
            handler: Box::new(handler),
        });
        HandlerId(self.registrations.len() - 1)
    }

    fn registration(&mut self, id: HandlerId) -> GpioResult<&mut Registration<'a>> {
        self.registrations.get_mut(id.0).ok_or(GpioError::InvalidArgument)
    }

    pub fn enable(&mut self, id: HandlerId) -> GpioResult<()> {
        self.registration(id)?.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self, id: HandlerId) -> GpioResult<()> {
        self.registration(id)?.enabled = false;
        Ok(())
    }

    pub fn set_global_enable(&mut self, enabled: bool) {
        self.global_enable = enabled;
    }

    pub fn is_globally_enabled(&self) -> bool {
        self.global_enable
    }

    /// Runs every enabled handler with a pending edge once, then clears the edges on its pins.
    ///
    /// Edges the handler itself causes are cleared along with the one that triggered it.
    /// Returns how many handlers ran.
    pub fn dispatch(&mut self) -> GpioResult<usize> {
        if !self.global_enable {
            return Ok(0);
        }

        let mut handled = 0;
        for (id, registration) in self.registrations.iter_mut().enumerate() {
            if !registration.enabled {
                continue;
            }

            let mut pending = false;
            for &pin in &registration.pins {
                if self.source.edge_pending(pin, registration.edge)? {
                    pending = true;
                    break;
                }
            }
            if !pending {
                continue;
            }

            trace!("Dispatching {:?} edge to handler {}", registration.edge, id);
            (registration.handler)()?;

            for &pin in &registration.pins {
                self.source.clear_edges(pin)?;
            }
            handled += 1;
        }

        Ok(handled)
    }
}

impl Debug for EdgeDispatcher<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EdgeDispatcher({:?}, {} handlers, {})",
            self.source,
            self.registrations.len(),
            if self.global_enable { "enabled" } else { "disabled" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpioDriver;
    use crate::sim::SimGpioDriver;
    use std::cell::Cell;

    #[test]
    fn nothing_runs_until_enabled() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut pin = gpio.get_pin(0).unwrap();
        let _input = pin.as_input().unwrap();
        let calls = Cell::new(0);

        let mut irq = EdgeDispatcher::new(&gpio);
        let id = irq.register(&[0], GpioEdge::Rising, || {
            calls.set(calls.get() + 1);
            Ok(())
        });

        gpio.set_input_level(0, Some(true)).unwrap();
        assert_eq!(irq.dispatch().unwrap(), 0);

        irq.enable(id).unwrap();
        assert_eq!(irq.dispatch().unwrap(), 0);

        irq.set_global_enable(true);
        assert_eq!(irq.dispatch().unwrap(), 1);
        assert_eq!(irq.dispatch().unwrap(), 0);
        drop(irq);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn edge_kind_is_respected() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut bus = gpio.get_pin_bus([0, 1]).unwrap();
        let _input = bus.as_input().unwrap();
        let rising = Cell::new(0);
        let falling = Cell::new(0);

        let mut irq = EdgeDispatcher::new(&gpio);
        let r = irq.register(&[0, 1], GpioEdge::Rising, || {
            rising.set(rising.get() + 1);
            Ok(())
        });
        let f = irq.register(&[1], GpioEdge::Falling, || {
            falling.set(falling.get() + 1);
            Ok(())
        });
        irq.enable(r).unwrap();
        irq.enable(f).unwrap();
        irq.set_global_enable(true);

        gpio.set_input_level(1, Some(true)).unwrap();
        assert_eq!(irq.dispatch().unwrap(), 1);
        gpio.set_input_level(1, Some(false)).unwrap();
        assert_eq!(irq.dispatch().unwrap(), 1);
        drop(irq);

        assert_eq!(rising.get(), 1);
        assert_eq!(falling.get(), 1);
    }

    #[test]
    fn disabled_handler_keeps_its_edge_latched() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut pin = gpio.get_pin(2).unwrap();
        let _input = pin.as_input().unwrap();
        let calls = Cell::new(0);

        let mut irq = EdgeDispatcher::new(&gpio);
        let id = irq.register(&[2], GpioEdge::Rising, || {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert!(!irq.is_globally_enabled());
        irq.enable(id).unwrap();
        irq.set_global_enable(true);
        assert!(irq.is_globally_enabled());

        irq.disable(id).unwrap();
        gpio.set_input_level(2, Some(true)).unwrap();
        assert_eq!(irq.dispatch().unwrap(), 0);
        assert!(gpio.edge_pending(2, GpioEdge::Rising).unwrap());

        irq.enable(id).unwrap();
        assert_eq!(irq.dispatch().unwrap(), 1);
        assert!(!gpio.edge_pending(2, GpioEdge::Rising).unwrap());
        drop(irq);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn handler_errors_propagate() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut pin = gpio.get_pin(3).unwrap();
        let _input = pin.as_input().unwrap();

        let mut irq = EdgeDispatcher::new(&gpio);
        let id = irq.register(&[3], GpioEdge::Both, || Err(GpioError::NotSupported));
        irq.enable(id).unwrap();
        irq.set_global_enable(true);

        gpio.set_input_level(3, Some(true)).unwrap();
        assert_eq!(irq.dispatch(), Err(GpioError::NotSupported));
        assert!(gpio.edge_pending(3, GpioEdge::Rising).unwrap());
    }

    #[test]
    fn unknown_handler_is_rejected() {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let mut irq = EdgeDispatcher::new(&gpio);
        assert_eq!(irq.enable(HandlerId(3)), Err(GpioError::InvalidArgument));
    }
}
