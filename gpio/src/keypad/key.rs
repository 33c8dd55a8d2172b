use std::fmt::{Display, Formatter};

/// Represents the keys on a 4x3 keypad.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeypadKey {
    /// The `1` key.
    Key1,
    /// The `2` key.
    Key2,
    /// The `3` key.
    Key3,
    /// The `4` key.
    Key4,
    /// The `5` key.
    Key5,
    /// The `6` key.
    Key6,
    /// The `7` key.
    Key7,
    /// The `8` key.
    Key8,
    /// The `9` key.
    Key9,
    /// The `0` key.
    Key0,
    /// The `*` key.
    KeyAsterisk,
    /// The `#` key.
    KeyHash,
}

impl KeypadKey {
    pub const ROWS: usize = 4;
    pub const COLS: usize = 3;

    const KEYS: [[KeypadKey; KeypadKey::COLS]; KeypadKey::ROWS] = {
        use KeypadKey::*;
        [
            [ Key1, Key2, Key3, ],
            [ Key4, Key5, Key6, ],
            [ Key7, Key8, Key9, ],
            [ KeyAsterisk, Key0, KeyHash, ],
        ]
    };

    /// Converts a position tuple (row, column) to a [KeypadKey].
    pub fn from_position(pos: (u8, u8)) -> Option<KeypadKey> {
        let (row, col) = (pos.0 as usize, pos.1 as usize);
        if row < Self::ROWS && col < Self::COLS {
            Some(Self::KEYS[row][col])
        } else {
            None
        }
    }

    /// Gets the (row, column) position of the key.
    pub fn position(self) -> (u8, u8) {
        use KeypadKey::*;

        match self {
            Key1 => (0, 0),
            Key2 => (0, 1),
            Key3 => (0, 2),
            Key4 => (1, 0),
            Key5 => (1, 1),
            Key6 => (1, 2),
            Key7 => (2, 0),
            Key8 => (2, 1),
            Key9 => (2, 2),
            KeyAsterisk => (3, 0),
            Key0 => (3, 1),
            KeyHash => (3, 2),
        }
    }

    /// Gets the numeric value of the key, or `None` for `*` and `#`.
    pub fn digit(self) -> Option<u8> {
        self.to_char().to_digit(10).map(|d| d as u8)
    }

    pub fn is_symbol(self) -> bool {
        self.digit().is_none()
    }

    /// Converts the [KeypadKey] to its corresponding character.
    pub fn to_char(self) -> char {
        use KeypadKey::*;

        match self {
            Key1 => '1',
            Key2 => '2',
            Key3 => '3',
            Key4 => '4',
            Key5 => '5',
            Key6 => '6',
            Key7 => '7',
            Key8 => '8',
            Key9 => '9',
            Key0 => '0',
            KeyAsterisk => '*',
            KeyHash => '#',
        }
    }

    /// Converts a character printed on the keypad back to a [KeypadKey].
    pub fn from_char(c: char) -> Option<KeypadKey> {
        Self::KEYS
            .iter()
            .flatten()
            .copied()
            .find(|key| key.to_char() == c)
    }
}

impl Display for KeypadKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// What the keypad last reported from an edge.
///
/// `Nothing` and `Key(KeyAsterisk | KeyHash)` are kept apart, so a symbol press is never
/// confused with an edge that found no key.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LastPressed {
    /// No edge has been handled yet.
    #[default]
    Never,
    /// The last edge was handled but no key was found.
    Nothing,
    Key(KeypadKey),
}

impl LastPressed {
    pub fn key(self) -> Option<KeypadKey> {
        match self {
            LastPressed::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn digit(self) -> Option<u8> {
        self.key().and_then(KeypadKey::digit)
    }

    /// Integer encoding used by older firmware:
    /// `-2` before any edge, `-1` for a symbol or no key, the digit otherwise.
    pub fn legacy_code(self) -> i8 {
        match self {
            LastPressed::Never => -2,
            _ => self.digit().map(|d| d as i8).unwrap_or(-1),
        }
    }
}

impl From<Option<KeypadKey>> for LastPressed {
    fn from(key: Option<KeypadKey>) -> Self {
        match key {
            Some(key) => LastPressed::Key(key),
            None => LastPressed::Nothing,
        }
    }
}
