mod gpio;
mod indicator;
mod key;

use std::fmt::Debug;
use crate::GpioResult;
pub use gpio::*;
pub use indicator::*;
pub use key::*;

/// The `Keypad` trait defines the interface for keypad input devices.
pub trait Keypad: Debug {
    type Key;

    /// Scans the whole keypad once and returns the key found, if any.
    fn scan(&self) -> GpioResult<Option<Self::Key>>;
}
