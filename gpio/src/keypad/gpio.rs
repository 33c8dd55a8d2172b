use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, TryLockError};
use log::{debug, trace, warn};
use crate::{GpioActiveLevel, GpioBias, GpioBus, GpioBusInput, GpioBusOutput, GpioDriver, GpioEdge, GpioError, GpioResult};
use crate::keypad::{Indicator, IndicatorState, Keypad, KeypadKey, LastPressed};

/// Which pins of a port the keypad is wired to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeypadPins {
    /// Left, middle and right column.
    pub cols: [usize; 3],
    /// Rows from the top (`1 2 3`) to the bottom (`* 0 #`).
    pub rows: [usize; 4],
    /// Level the columns are driven to when active, and the rows read when a key closes.
    pub active_level: GpioActiveLevel,
}

impl Default for KeypadPins {
    fn default() -> Self {
        KeypadPins {
            cols: [4, 5, 6],
            rows: [0, 1, 2, 3],
            active_level: GpioActiveLevel::High,
        }
    }
}

impl KeypadPins {
    /// Claims the column and row buses from the driver and applies the active level.
    ///
    /// Rows get a bias pulling them to the inactive level when the driver supports it.
    pub fn claim<'d, D: GpioDriver>(&self, driver: &'d D) -> GpioResult<KeypadBuses<'d>> {
        let mut cols = driver.get_pin_bus(self.cols)?;
        let mut rows = driver.get_pin_bus(self.rows)?;

        if self.active_level != GpioActiveLevel::High {
            cols.set_active_level(self.active_level)?;
            rows.set_active_level(self.active_level)?;
        }

        if rows.supports_bias() {
            rows.set_bias(match self.active_level {
                GpioActiveLevel::High => GpioBias::PullDown,
                GpioActiveLevel::Low => GpioBias::PullUp,
            })?;
        }

        Ok(KeypadBuses { cols, rows })
    }

    /// Gets the edge a row sees when a key closes while every column is active.
    pub fn press_edge(&self) -> GpioEdge {
        match self.active_level {
            GpioActiveLevel::High => GpioEdge::Rising,
            GpioActiveLevel::Low => GpioEdge::Falling,
        }
    }

    /// Gets the (row pin, column pin) pair a key connects.
    pub fn switch_for(&self, key: KeypadKey) -> (usize, usize) {
        let (row, col) = key.position();
        (self.rows[row as usize], self.cols[col as usize])
    }
}

/// Column and row buses claimed for a keypad, not yet configured.
#[derive(Debug)]
pub struct KeypadBuses<'d> {
    pub cols: Box<dyn GpioBus<3> + 'd>,
    pub rows: Box<dyn GpioBus<4> + 'd>,
}

/// The `GpioKeypad` struct represents a GPIO-based keypad with 3 columns and 4 rows.
///
/// One instance drives one keypad. Binding another port means binding a new instance.
///
/// Only one key is reported per scan. When several are held, the leftmost column wins,
/// and within a column the topmost row.
pub struct GpioKeypad<'a> {
    cols: Box<dyn GpioBusOutput<3> + 'a>,
    rows: Box<dyn GpioBusInput<4> + 'a>,
    indicator: Option<Box<dyn Indicator + 'a>>,
    last_pressed: Mutex<LastPressed>,
}

impl Debug for GpioKeypad<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioKeypad({:?}, {:?})", self.cols, self.rows)
    }
}

impl<'a> GpioKeypad<'a> {
    const ALL_COLS: u32 = 0b111;

    /// Binds a keypad to buses claimed with [KeypadPins::claim].
    pub fn bind(buses: &'a mut KeypadBuses<'_>) -> GpioResult<Self> {
        Self::bind_buses(&mut *buses.cols, &mut *buses.rows)
    }

    /// Configures the columns as outputs and the rows as inputs, then drives every column
    /// active so that any key press shows up as an edge on its row.
    pub fn bind_buses(cols: &'a mut dyn GpioBus<3>, rows: &'a mut dyn GpioBus<4>) -> GpioResult<Self> {
        let cols = cols.as_output()?;
        let rows = rows.as_input()?;

        let keypad = GpioKeypad {
            cols,
            rows,
            indicator: None,
            last_pressed: Mutex::new(LastPressed::Never),
        };
        keypad.arm()?;

        debug!("{:?} bound.", keypad);
        Ok(keypad)
    }

    /// Sets the indicator updated by [on_key_edge](Self::on_key_edge).
    pub fn with_indicator(mut self, indicator: impl Indicator + 'a) -> Self {
        self.indicator = Some(Box::new(indicator));
        self
    }

    /// Drives every column active.
    pub fn arm(&self) -> GpioResult<()> {
        self.cols.write_mask(Self::ALL_COLS)
    }

    /// Drives only the given column active and returns the topmost active row, if any.
    pub fn scan_column(&self, col: usize) -> GpioResult<Option<usize>> {
        if col >= KeypadKey::COLS {
            return Err(GpioError::InvalidArgument);
        }

        self.cols.write_mask(1 << col)?;
        let rows = self.rows.read_mask()?;
        trace!("Column {}: rows {:04b}", col, rows);

        if rows == 0 {
            Ok(None)
        } else {
            Ok(Some(rows.trailing_zeros() as usize))
        }
    }

    /// Handles an edge on the rows: scans once, records the result, updates the indicator
    /// and re-arms the columns, in that order.
    ///
    /// The body runs with the keypad state locked. A call arriving while another is in
    /// progress is refused with [GpioError::AlreadyInUse] and changes nothing. The keypad
    /// holds non-`Send` bus handles, so the lock only guards against re-entry on the
    /// thread that owns it; it does not make the keypad shareable across threads.
    ///
    /// If an earlier call panicked halfway, the state is recovered and handled as usual.
    pub fn on_key_edge(&self) -> GpioResult<()> {
        let mut last_pressed = match self.last_pressed.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                warn!("Key edge arrived while the previous one was still being handled.");
                return Err(GpioError::AlreadyInUse);
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!("Previous key edge handler panicked, recovering.");
                self.last_pressed.clear_poison();
                poisoned.into_inner()
            }
        };

        let handled = self.scan().and_then(|key| {
            *last_pressed = LastPressed::from(key);
            debug!("Key edge: {:?}", *last_pressed);

            match &self.indicator {
                Some(indicator) => indicator.show(match key.and_then(KeypadKey::digit) {
                    Some(_) => IndicatorState::KeyDetected,
                    None => IndicatorState::Off,
                }),
                None => Ok(()),
            }
        });

        // Re-arm last, even when the scan failed, so the next press still raises an edge.
        let armed = self.arm();
        handled.and(armed)
    }

    /// Gets what the last handled edge found, or [LastPressed::Never] before the first one.
    pub fn last_pressed(&self) -> LastPressed {
        match self.last_pressed.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Keypad for GpioKeypad<'_> {
    type Key = KeypadKey;

    /// Scans the left, middle and right column in turn and stops at the first one with an
    /// active row. Symbols come back as keys; `None` means nothing was found.
    fn scan(&self) -> GpioResult<Option<Self::Key>> {
        for col in 0..KeypadKey::COLS {
            if let Some(row) = self.scan_column(col)? {
                return Ok(KeypadKey::from_position((row as u8, col as u8)));
            }
        }
        Ok(None)
    }
}
