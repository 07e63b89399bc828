//! Log storage
//!
//! The storage medium is abstracted as a flat directory of named files. Session logs are named
//! `<n>.dat` with `n` counting up from zero; each converted table sits next to its log as
//! `<n>.csv`.
mod writer;

pub use writer::{Clock, Instant, Pumped, StorageWriter};

use core::fmt::Write as _;
use embedded_io::Write as _;
use heapless::String;

use crate::design_parameters::{LOG_EXTENSION, SELF_TEST_FILE};
use crate::Error;

/// An open file.
pub trait LogFile:
    embedded_io::Read + embedded_io::Write + embedded_io::Seek
{
    /// Current length of the file in bytes.
    fn size(&mut self) -> Result<u64, Self::Error>;

    /// Flush and release the file.
    fn close(self) -> Result<(), Self::Error>;
}

/// A storage medium holding a single flat directory.
pub trait Storage {
    type Error: embedded_io::Error;
    type File: LogFile;

    /// Bring up the medium and mount its file system.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Create `name`, truncating it if it exists, and open it for reading and writing.
    fn create(&mut self, name: &str) -> Result<Self::File, Self::Error>;

    /// Open an existing file positioned at its start.
    fn open(&mut self, name: &str) -> Result<Self::File, Self::Error>;

    fn exists(&mut self, name: &str) -> Result<bool, Self::Error>;
}

/// An 8.3 file name.
pub type FileName = String<12>;

/// Name of the log with the given index.
pub fn log_name(index: u16) -> FileName {
    let mut name = FileName::new();
    // "65535.dat" always fits.
    write!(name, "{index}.{LOG_EXTENSION}").ok();
    name
}

/// Replace the extension of `name`.
pub fn with_extension(name: &str, extension: &str) -> Result<FileName, Error> {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    let mut renamed = FileName::new();
    write!(renamed, "{stem}.{extension}")?;
    Ok(renamed)
}

/// The smallest log name not yet present on the medium.
pub fn next_log_name<S: Storage>(storage: &mut S) -> Result<FileName, Error> {
    for index in 0..=u16::MAX {
        let name = log_name(index);
        if !storage.exists(&name).map_err(storage_error)? {
            return Ok(name);
        }
    }
    Err(Error::NamesExhausted)
}

/// The most recent log: the last of the contiguous run of indices starting at zero.
pub fn latest_log_name<S: Storage>(
    storage: &mut S,
) -> Result<Option<FileName>, Error> {
    let mut latest = None;
    for index in 0..=u16::MAX {
        let name = log_name(index);
        if !storage.exists(&name).map_err(storage_error)? {
            break;
        }
        latest = Some(name);
    }
    Ok(latest)
}

/// Prove the medium accepts writes by creating, writing and closing a scratch file.
pub fn self_test<S: Storage>(storage: &mut S) -> Result<(), Error> {
    let mut file = storage.create(SELF_TEST_FILE).map_err(storage_error)?;
    file.write_all(b"FIRESIDE").map_err(storage_error)?;
    file.flush().map_err(storage_error)?;
    file.close().map_err(storage_error)
}

fn storage_error<E: embedded_io::Error>(error: E) -> Error {
    crate::error::storage(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStorage;

    #[test]
    fn naming() {
        assert_eq!(log_name(0), "0.dat");
        assert_eq!(log_name(417), "417.dat");
        assert_eq!(with_extension("12.dat", "csv").unwrap(), "12.csv");
        assert_eq!(with_extension("LOG", "csv").unwrap(), "LOG.csv");
        assert_eq!(
            with_extension("toolongname.dat", "csv"),
            Err(Error::Format)
        );
    }

    #[test]
    fn next_name_fills_first_gap() {
        let mut storage = MemStorage::default();
        assert_eq!(next_log_name(&mut storage).unwrap(), "0.dat");

        storage.insert("0.dat", b"");
        storage.insert("1.dat", b"");
        storage.insert("3.dat", b"");
        assert_eq!(next_log_name(&mut storage).unwrap(), "2.dat");
    }

    #[test]
    fn latest_name_probes_contiguous_run() {
        let mut storage = MemStorage::default();
        assert_eq!(latest_log_name(&mut storage).unwrap(), None);

        storage.insert("0.dat", b"");
        storage.insert("1.dat", b"");
        storage.insert("3.dat", b"");
        assert_eq!(
            latest_log_name(&mut storage).unwrap().as_deref(),
            Some("1.dat")
        );
    }

    #[test]
    fn self_test_writes_marker() {
        let mut storage = MemStorage::default();
        self_test(&mut storage).unwrap();
        assert_eq!(storage.contents(SELF_TEST_FILE).unwrap(), b"FIRESIDE");

        storage.fail_writes(true);
        assert_eq!(
            self_test(&mut storage),
            Err(Error::Storage(embedded_io::ErrorKind::Other))
        );
    }
}
