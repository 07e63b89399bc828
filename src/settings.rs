//! FireSide Settings
//!
//! # Design
//! Settings are optional. At boot the storage medium is checked for a small JSON file and any
//! fields present override the compiled-in defaults. A missing or malformed file leaves the
//! defaults in place, so a blank card always yields a working device.
//!
//! ```json
//! {"sample_rate": 2000, "failure_retry_ms": 10000}
//! ```
use embedded_io::Read as _;
use fugit::HertzU32;
use serde::{Deserialize, Serialize};

use crate::design_parameters::{
    BLINK_PERIOD_MS, FAILURE_RETRY_MS, PROGRESS_INTERVAL, SAMPLE_RATE,
    SETTINGS_FILE,
};
use crate::storage::{LogFile, Storage};

/// Largest settings file that is read.
const MAX_SIZE: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Row rate of continuous acquisition in Hz.
    pub sample_rate: u32,
    /// Delay between repeated diagnostics in the failure state.
    pub failure_retry_ms: u32,
    /// Period of one error-code blink cycle.
    pub blink_period_ms: u32,
    /// Log bytes between conversion progress reports.
    pub progress_interval: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE.raw(),
            failure_retry_ms: FAILURE_RETRY_MS,
            blink_period_ms: BLINK_PERIOD_MS,
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

impl Settings {
    pub fn sample_rate(&self) -> HertzU32 {
        HertzU32::from_raw(self.sample_rate)
    }

    /// Load settings from the storage medium, falling back to defaults.
    pub fn load<S: Storage>(storage: &mut S) -> Self {
        let mut buffer = [0u8; MAX_SIZE];
        let len = match read(storage, &mut buffer) {
            Ok(Some(len)) => len,
            Ok(None) => {
                log::info!("No {SETTINGS_FILE}, using defaults");
                return Self::default();
            }
            Err(e) => {
                log::warn!("Failed to read {SETTINGS_FILE}: {e:?}");
                return Self::default();
            }
        };

        match Self::parse(&buffer[..len]) {
            Ok(settings) => {
                log::info!("Loaded {settings:?}");
                settings
            }
            Err(e) => {
                log::warn!("Malformed {SETTINGS_FILE}: {e:?}");
                Self::default()
            }
        }
    }

    pub fn parse(json: &[u8]) -> Result<Self, serde_json_core::de::Error> {
        let (settings, _): (Self, _) = serde_json_core::from_slice(json)?;
        Ok(settings.validated())
    }

    /// Serialize for writing an editable settings file.
    pub fn to_json(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, serde_json_core::ser::Error> {
        serde_json_core::to_slice(self, buffer)
    }

    /// Replace values that cannot be used with their defaults.
    fn validated(self) -> Self {
        let defaults = Self::default();
        let pick = |value: u32, default: u32, name: &str| {
            if value == 0 {
                log::warn!("Setting `{name}` must be non-zero");
                default
            } else {
                value
            }
        };
        Self {
            sample_rate: pick(
                self.sample_rate,
                defaults.sample_rate,
                "sample_rate",
            ),
            failure_retry_ms: self.failure_retry_ms,
            blink_period_ms: pick(
                self.blink_period_ms,
                defaults.blink_period_ms,
                "blink_period_ms",
            ),
            progress_interval: pick(
                self.progress_interval,
                defaults.progress_interval,
                "progress_interval",
            ),
        }
    }
}

fn read<S: Storage>(
    storage: &mut S,
    buffer: &mut [u8],
) -> Result<Option<usize>, embedded_io::ErrorKind> {
    use embedded_io::Error as _;

    if !storage.exists(SETTINGS_FILE).map_err(|e| e.kind())? {
        return Ok(None);
    }

    let mut file = storage.open(SETTINGS_FILE).map_err(|e| e.kind())?;
    let mut len = 0;
    while len < buffer.len() {
        match file.read(&mut buffer[len..]).map_err(|e| e.kind())? {
            0 => break,
            n => len += n,
        }
    }
    file.close().map_err(|e| e.kind())?;
    Ok(Some(len))
}
