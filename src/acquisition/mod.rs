//! Double-buffered acquisition
//!
//! # Design
//!
//! The converter scans all channels at a fixed row rate and a DMA stream moves every sample into
//! a single circular region in RAM. The region is split into two halves of identical size. The
//! transfer engine raises an event when either half has been filled and carries on into the
//! other half without software intervention.
//!
//! Software therefore only ever has to decide who owns which half. At any time one half is the
//! *current* buffer (being filled by the transfer engine) and the other is *pending* (being
//! committed to storage by the main loop). A single role tag names the current half; roles are
//! rotated by updating the tag, the samples themselves are never copied.
//!
//! Each half carries two status fields:
//! * the transfer status ([`DmaStatus`]) is advanced by the transfer-complete handler, and
//! * the store status ([`StoreStatus`]) is advanced by the storage writer.
//!
//! When the current half completes, the handler checks that the pending half has been fully
//! drained before handing it back to the transfer engine. If the writer is still reading it, or
//! has not even claimed it yet, the next samples would land on data that is not yet on storage.
//! That condition is an overrun: conversions are stopped and a fault is latched for the main loop
//! to report. There is no hardware FIFO to absorb a late swap, so the check is the only guard.
//!
//! ## Stopping
//!
//! A stop is requested from the main loop and honoured at the next half boundary, so the last
//! block on storage is always complete. The handler stops conversions, does not re-arm, and marks
//! the session finished. The main loop then drains the final pending half.
//!
//! # Note
//!
//! All shared state is single-byte atomics used with plain loads and stores. No read-modify-write
//! operations are needed because each field has exactly one writer at any time.
mod buffer;
mod controller;

pub use buffer::{BufferStatus, DmaStatus, StoreStatus};
pub use controller::{Converter, DmaRegion, Handoff, Mode, TransferController};

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

use crate::channels::SampleBlock;
use crate::Error;

/// One half of the circular region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Half {
    #[num_enum(default)]
    Lower = 0,
    Upper = 1,
}

impl Half {
    pub const fn other(self) -> Self {
        match self {
            Half::Lower => Half::Upper,
            Half::Upper => Half::Lower,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Terminal acquisition fault latched by the transfer-complete handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Fault {
    Overrun = 1,
    Transfer = 2,
    Desync = 3,
}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Overrun => Error::Overrun,
            Fault::Transfer => Error::Transfer,
            Fault::Desync => Error::Desync,
        }
    }
}

/// The sample region and the state shared between the transfer-complete handler and the main
/// loop.
///
/// Intended to live in a `static` so that both contexts can hold a shared reference.
pub struct Acquisition<const CHANNELS: usize, const ROWS: usize> {
    region: UnsafeCell<[SampleBlock<CHANNELS, ROWS>; 2]>,
    status: [BufferStatus; 2],
    current: AtomicU8,
    running: AtomicBool,
    stop_requested: AtomicBool,
    finished: AtomicBool,
    fault: AtomicU8,
}

// Note(unsafe): Access to the sample region is serialised by the status protocol. The transfer
// engine only fills the current half, the storage writer only touches the pending half while its
// transfer status is `Done`, and the region as a whole is only cleared while conversions are
// stopped.
unsafe impl<const CHANNELS: usize, const ROWS: usize> Sync
    for Acquisition<CHANNELS, ROWS>
{
}

impl<const CHANNELS: usize, const ROWS: usize> Default
    for Acquisition<CHANNELS, ROWS>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const CHANNELS: usize, const ROWS: usize> Acquisition<CHANNELS, ROWS> {
    pub const fn new() -> Self {
        Self {
            region: UnsafeCell::new([[[0; CHANNELS]; ROWS]; 2]),
            status: [BufferStatus::new(), BufferStatus::new()],
            current: AtomicU8::new(Half::Lower as u8),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            fault: AtomicU8::new(0),
        }
    }

    /// Prepare for a new session: zero both halves, clear all flags and make the lower half
    /// current and armed.
    ///
    /// # Returns
    /// [`Error::Busy`] if conversions are still running.
    pub fn reset(&self) -> Result<(), Error> {
        if self.running() {
            return Err(Error::Busy);
        }

        // Note(unsafe): Conversions are stopped, nothing else references the region.
        bytemuck::fill_zeroes(unsafe { &mut *self.region.get() });

        for status in self.status.iter() {
            status.clear();
        }
        self.status(Half::Lower).set_dma(DmaStatus::Active);
        self.set_current(Half::Lower);
        self.stop_requested.store(false, Ordering::Release);
        self.finished.store(false, Ordering::Release);
        self.fault.store(0, Ordering::Release);
        Ok(())
    }

    /// The memory the transfer engine is pointed at.
    pub fn dma_region(&self) -> DmaRegion {
        DmaRegion {
            address: self.region.get().cast::<u16>(),
            len: 2 * CHANNELS * ROWS,
        }
    }

    pub fn status(&self, half: Half) -> &BufferStatus {
        &self.status[half.index()]
    }

    /// The half being filled by the transfer engine.
    pub fn current(&self) -> Half {
        Half::from(self.current.load(Ordering::Acquire))
    }

    /// The half owned by the storage writer.
    pub fn pending(&self) -> Half {
        self.current().other()
    }

    /// Ask for acquisition to end at the next half boundary.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Whether conversions are running.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether a requested stop has been honoured.
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Whether the pending half holds no undrained samples.
    pub fn drained(&self) -> bool {
        self.status(self.pending()).dma() != DmaStatus::Done
    }

    pub fn fault(&self) -> Option<Fault> {
        Fault::try_from(self.fault.load(Ordering::Acquire)).ok()
    }

    /// Borrow the samples of one half.
    ///
    /// # Safety
    /// The transfer engine must not be writing `half`, i.e. its transfer status is `Done`.
    pub(crate) unsafe fn block(
        &self,
        half: Half,
    ) -> &SampleBlock<CHANNELS, ROWS> {
        &(*self.region.get())[half.index()]
    }

    /// Mutably borrow the samples of one half.
    ///
    /// # Safety
    /// As [`Self::block`], and no other reference to `half` may be live.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn block_mut(
        &self,
        half: Half,
    ) -> &mut SampleBlock<CHANNELS, ROWS> {
        &mut (*self.region.get())[half.index()]
    }

    pub(crate) fn set_current(&self, half: Half) {
        self.current.store(half.into(), Ordering::Release);
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn set_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub(crate) fn set_fault(&self, fault: Fault) {
        self.fault.store(fault.into(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_arms_lower_half() {
        let acquisition = Acquisition::<2, 4>::new();
        acquisition.reset().unwrap();

        assert_eq!(acquisition.current(), Half::Lower);
        assert_eq!(acquisition.pending(), Half::Upper);
        assert_eq!(acquisition.status(Half::Lower).dma(), DmaStatus::Active);
        assert_eq!(
            acquisition.status(Half::Upper).dma(),
            DmaStatus::Inactive
        );
        assert!(acquisition.drained());
        assert!(!acquisition.finished());
        assert_eq!(acquisition.fault(), None);
    }

    #[test]
    fn reset_refused_while_running() {
        let acquisition = Acquisition::<1, 1>::new();
        acquisition.set_running(true);
        assert_eq!(acquisition.reset(), Err(Error::Busy));
        acquisition.set_running(false);
        assert_eq!(acquisition.reset(), Ok(()));
    }

    #[test]
    fn reset_clears_samples_and_faults() {
        let acquisition = Acquisition::<2, 2>::new();
        unsafe { acquisition.block_mut(Half::Upper)[1][1] = 0xabc };
        acquisition.set_fault(Fault::Overrun);
        acquisition.request_stop();
        acquisition.reset().unwrap();

        assert_eq!(unsafe { acquisition.block(Half::Upper) }, &[[0; 2]; 2]);
        assert_eq!(acquisition.fault(), None);
        assert!(!acquisition.stop_requested());
    }

    #[test]
    fn region_covers_both_halves() {
        let acquisition = Acquisition::<3, 5>::new();
        let region = acquisition.dma_region();
        assert_eq!(region.len, 30);
        assert_eq!(region.half_len(), 15);
        let upper = unsafe { acquisition.block(Half::Upper) }.as_ptr();
        assert_eq!(
            upper.cast::<u16>(),
            region.address.wrapping_add(15).cast_const()
        );
    }
}
