use std::env::var_os;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use padscan_gpio::GpioActiveLevel;
use padscan_gpio::keypad::KeypadPins;
use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub keypad_port: String,
    pub keypad_port_pins: usize,
    pub keypad_cols: [usize; 3],
    pub keypad_rows: [usize; 4],
    pub keypad_active_low: bool,
    pub led_port: String,
    pub led_port_pins: usize,
    /// Red, blue, green.
    pub led_pins: [usize; 3],
}

impl Config {
    fn path() -> PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("padscan.json"));
        Path::new(config_str).to_path_buf()
    }

    /// Loads the config file. `Ok(None)` only when the file does not exist; a file that
    /// cannot be read or parsed is an error, so it never gets overwritten with defaults.
    pub fn try_load() -> eyre::Result<Option<Self>> {
        Self::load_from(&Self::path())
    }

    fn load_from(config_path: &Path) -> eyre::Result<Option<Self>> {
        if !config_path.exists() {
            return Ok(None);
        }

        let file = std::fs::File::open(config_path)?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .map_err(|e| eyre::eyre!("Invalid config in {}: {}", config_path.display(), e))?;
        Ok(Some(config))
    }

    pub fn save(&self) -> std::io::Result<()> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn keypad_pins(&self) -> KeypadPins {
        KeypadPins {
            cols: self.keypad_cols,
            rows: self.keypad_rows,
            active_level: if self.keypad_active_low {
                GpioActiveLevel::Low
            } else {
                GpioActiveLevel::High
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let pins = KeypadPins::default();
        Config {
            keypad_port: "PORTB".to_string(),
            keypad_port_pins: 8,
            keypad_cols: pins.cols,
            keypad_rows: pins.rows,
            keypad_active_low: false,
            led_port: "PORTF".to_string(),
            led_port_pins: 8,
            led_pins: [1, 2, 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{ "keypad_active_low": true }"#).unwrap();
        assert_eq!(config.keypad_cols, [4, 5, 6]);
        assert_eq!(config.keypad_pins().active_level, GpioActiveLevel::Low);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = std::env::temp_dir().join(format!("padscan-missing-{}.json", std::process::id()));
        assert!(Config::load_from(&path).unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_an_error_and_left_alone() {
        let path = std::env::temp_dir().join(format!("padscan-malformed-{}.json", std::process::id()));
        std::fs::write(&path, "{ \"keypad_cols\": [4, 5").unwrap();

        assert!(Config::load_from(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ \"keypad_cols\": [4, 5");

        std::fs::remove_file(&path).unwrap();
    }
}
