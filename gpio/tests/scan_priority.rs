use padscan_gpio::keypad::{GpioKeypad, Keypad, KeypadKey, KeypadPins};
use padscan_gpio::sim::SimGpioDriver;
use proptest::prelude::*;

fn held_keys() -> impl Strategy<Value = Vec<(u8, u8)>> {
    prop::collection::vec((0u8..4, 0u8..3), 0..6)
}

proptest! {
    #[test]
    fn leftmost_then_topmost_key_wins(held in held_keys()) {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let pins = KeypadPins::default();
        let mut buses = pins.claim(&gpio).unwrap();
        let keypad = GpioKeypad::bind(&mut buses).unwrap();

        for &(row, col) in &held {
            gpio.press(pins.rows[row as usize], pins.cols[col as usize]).unwrap();
        }

        let expected = held
            .iter()
            .min_by_key(|&&(row, col)| (col, row))
            .and_then(|&pos| KeypadKey::from_position(pos));
        prop_assert_eq!(keypad.scan().unwrap(), expected);
    }

    #[test]
    fn scan_column_reports_the_topmost_row(rows in prop::collection::btree_set(0usize..4, 0..4), col in 0usize..3) {
        let gpio = SimGpioDriver::new("PORTB", 8);
        let pins = KeypadPins::default();
        let mut buses = pins.claim(&gpio).unwrap();
        let keypad = GpioKeypad::bind(&mut buses).unwrap();

        for &row in &rows {
            gpio.press(pins.rows[row], pins.cols[col]).unwrap();
        }

        prop_assert_eq!(keypad.scan_column(col).unwrap(), rows.iter().next().copied());
        for other in (0..3).filter(|&c| c != col) {
            prop_assert_eq!(keypad.scan_column(other).unwrap(), None);
        }
    }
}
