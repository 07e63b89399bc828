use super::LogFile;
use crate::acquisition::{Acquisition, DmaStatus, Half, StoreStatus};
use crate::error::storage;
use crate::Error;

/// A microsecond timestamp. Wraps after ~71.6 minutes.
pub type Instant = fugit::TimerInstantU32<1_000_000>;

/// Free-running microsecond time base.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Outcome of one [`StorageWriter::pump`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pumped {
    /// No filled half was waiting.
    Idle,
    /// A record was appended for `half`, stamped with `timestamp` microseconds.
    Wrote { half: Half, timestamp: u32 },
}

/// Appends filled halves to the session log.
///
/// # Note
/// Each record is a little-endian `u32` microsecond timestamp followed by the raw sample block.
/// The file carries no header; records are appended back to back.
pub struct StorageWriter<F> {
    file: Option<F>,
    records: u32,
}

impl<F: LogFile> StorageWriter<F> {
    pub fn new(file: F) -> Self {
        Self {
            file: Some(file),
            records: 0,
        }
    }

    /// Number of records appended so far.
    pub fn records(&self) -> u32 {
        self.records
    }

    /// Commit the pending half if it has been filled.
    ///
    /// # Note
    /// Called from the main loop as often as possible. If the transfer-complete handler has
    /// latched a fault, the log is closed and the fault is returned.
    pub fn pump<const CHANNELS: usize, const ROWS: usize>(
        &mut self,
        acquisition: &Acquisition<CHANNELS, ROWS>,
        clock: &impl Clock,
    ) -> Result<Pumped, Error> {
        if let Some(fault) = acquisition.fault() {
            log::error!("Acquisition fault: {fault:?}");
            if let Err(e) = self.close() {
                log::error!("Log close after fault: {e}");
            }
            return Err(fault.into());
        }

        let Some(file) = self.file.as_mut() else {
            return Err(Error::Storage(embedded_io::ErrorKind::Other));
        };

        let half = acquisition.pending();
        let status = acquisition.status(half);
        if status.dma() != DmaStatus::Done {
            return Ok(Pumped::Idle);
        }

        let timestamp = clock.now().ticks();
        status.set_timestamp(timestamp);
        status.set_store(StoreStatus::Writing);

        // Note(unsafe): The half is `Done` so the transfer engine has moved on, and the handler
        // will not re-arm it while it is `Writing`.
        let block = unsafe { acquisition.block(half) };
        file.write_all(&timestamp.to_le_bytes()).map_err(storage)?;
        file.write_all(bytemuck::bytes_of(block)).map_err(storage)?;

        status.set_store(StoreStatus::Done);
        // Note(unsafe): As above; the shared borrow of the block has ended.
        bytemuck::fill_zeroes(unsafe { acquisition.block_mut(half) });
        status.set_dma(DmaStatus::Inactive);

        self.records += 1;
        Ok(Pumped::Wrote { half, timestamp })
    }

    /// Flush and close the log. Further pumps fail.
    pub fn close(&mut self) -> Result<(), Error> {
        match self.file.take() {
            Some(mut file) => {
                file.flush().map_err(storage)?;
                file.close().map_err(storage)
            }
            None => Ok(()),
        }
    }
}
