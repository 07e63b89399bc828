use fugit::HertzU32;

/// The number of analog inputs scanned per conversion row.
pub const CHANNELS: usize = 8;

/// The number of conversion rows captured into one half of the DMA region.
// At the default row rate of 5 kHz one half fills in ~102 ms, which is the time the storage writer
// has to commit the previous half.
pub const ROWS_PER_BLOCK: usize = 512;

/// The native write-block size of the storage medium in bytes.
pub const STORAGE_BLOCK_SIZE: usize = 512;

/// The size in bytes of one sample block (one DMA half).
pub const BLOCK_SIZE: usize =
    CHANNELS * ROWS_PER_BLOCK * core::mem::size_of::<u16>();

// Whole storage blocks per DMA half keep the payload writes aligned.
const _: () = assert!(BLOCK_SIZE % STORAGE_BLOCK_SIZE == 0);

/// ADC conversion resolution.
pub const ADC_RESOLUTION_BITS: u8 = 12;

/// ADC reference voltage. A full-scale code corresponds to this voltage.
pub const ADC_REFERENCE_VOLTS: f32 = 3.3;

/// Default rate at which complete rows (one sample per channel) are captured.
pub const SAMPLE_RATE: HertzU32 = HertzU32::from_raw(5_000);

/// Delay between repeated diagnostics while in the failure state.
pub const FAILURE_RETRY_MS: u32 = 5_000;

/// Period of one error-code blink cycle.
pub const BLINK_PERIOD_MS: u32 = 5_000;

/// Number of log bytes consumed between conversion progress reports.
pub const PROGRESS_INTERVAL: u32 = 128 * 1024;

/// Extension of binary session logs.
pub const LOG_EXTENSION: &str = "dat";

/// Extension of converted tables.
pub const TABLE_EXTENSION: &str = "csv";

/// Scratch file used to prove the storage medium is writable.
pub const SELF_TEST_FILE: &str = "Test.chk";

/// Optional settings file read at boot.
pub const SETTINGS_FILE: &str = "FIRESIDE.CFG";

/// Text prefixed to every outgoing telemetry line.
pub const LINK_HEADER: &str = "FS> ";
