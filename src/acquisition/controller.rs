use super::{Acquisition, DmaStatus, Fault, Half, StoreStatus};
use crate::channels::ChannelConfig;
use crate::Error;

/// Converter sequencing mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// One software-triggered scan of all channels.
    SingleShot,
    /// Free-running scans at the configured row rate, moved out by circular DMA.
    Continuous,
}

/// Memory the transfer engine writes into: both halves back to back.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DmaRegion {
    pub address: *mut u16,
    /// Total number of samples in the region.
    pub len: usize,
}

impl DmaRegion {
    /// Number of samples per half. The transfer engine signals after each half.
    pub fn half_len(&self) -> usize {
        self.len / 2
    }
}

/// Platform access to the analog converter and its transfer engine.
///
/// # Note
/// Methods take `&self`: the converter is shared between the main loop, which configures and
/// starts it, and the transfer-complete handler, which stops it. Implementations use interior
/// mutability or direct register access.
///
/// The platform's transfer interrupt calls [`TransferController::on_transfer_complete`] on each
/// half- and full-transfer event and [`TransferController::on_transfer_error`] on a bus error.
pub trait Converter<const CHANNELS: usize> {
    type Error: core::fmt::Debug;

    /// Program resolution, scan sequence and (in continuous mode) the row rate.
    fn configure(
        &self,
        config: &ChannelConfig<CHANNELS>,
        mode: Mode,
    ) -> Result<(), Self::Error>;

    /// Point the transfer engine at the region in circular mode with half-transfer events.
    fn arm_circular(&self, region: DmaRegion) -> Result<(), Self::Error>;

    fn start(&self) -> Result<(), Self::Error>;

    /// Stop conversions and transfers. Must be callable from interrupt context.
    fn stop(&self);

    /// Run one software-triggered scan.
    fn sample_once(
        &self,
        samples: &mut [u16; CHANNELS],
    ) -> Result<(), Self::Error>;
}

/// Outcome of a transfer-complete event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Handoff {
    /// The completed half is pending and the given half was armed.
    Armed(Half),
    /// A stop was honoured. The completed half is the last one to drain.
    Finished(Half),
    Overrun,
    Desync,
    /// Conversions were not running. Late events after a stop land here.
    Ignored,
}

/// Drives the buffer handoff on transfer events.
///
/// Cheap to copy: one copy is typically owned by the main loop and one by the interrupt handler.
pub struct TransferController<'a, C, const CHANNELS: usize, const ROWS: usize> {
    acquisition: &'a Acquisition<CHANNELS, ROWS>,
    converter: &'a C,
}

impl<C, const CHANNELS: usize, const ROWS: usize> Clone
    for TransferController<'_, C, CHANNELS, ROWS>
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, const CHANNELS: usize, const ROWS: usize> Copy
    for TransferController<'_, C, CHANNELS, ROWS>
{
}

impl<'a, C, const CHANNELS: usize, const ROWS: usize>
    TransferController<'a, C, CHANNELS, ROWS>
where
    C: Converter<CHANNELS>,
{
    pub fn new(
        acquisition: &'a Acquisition<CHANNELS, ROWS>,
        converter: &'a C,
    ) -> Self {
        Self {
            acquisition,
            converter,
        }
    }

    pub fn acquisition(&self) -> &'a Acquisition<CHANNELS, ROWS> {
        self.acquisition
    }

    pub fn converter(&self) -> &'a C {
        self.converter
    }

    /// Reset the region and configure the converter for continuous acquisition into it.
    /// Conversions are not started.
    pub fn prepare(
        &self,
        config: &ChannelConfig<CHANNELS>,
    ) -> Result<(), Error> {
        self.acquisition.reset()?;
        self.converter
            .configure(config, Mode::Continuous)
            .map_err(converter)?;
        self.converter
            .arm_circular(self.acquisition.dma_region())
            .map_err(converter)
    }

    /// Start conversions into the prepared region.
    pub fn start(&self) -> Result<(), Error> {
        self.acquisition.set_running(true);
        self.converter.start().map_err(|e| {
            self.acquisition.set_running(false);
            converter(e)
        })
    }

    /// Stop conversions immediately, wherever the transfer engine is.
    pub fn halt(&self) {
        self.converter.stop();
        self.acquisition.set_running(false);
    }

    /// Run a single scan of all channels.
    ///
    /// # Returns
    /// [`Error::Busy`] if continuous acquisition is running.
    pub fn sample_once(
        &self,
        config: &ChannelConfig<CHANNELS>,
    ) -> Result<[u16; CHANNELS], Error> {
        if self.acquisition.running() {
            return Err(Error::Busy);
        }
        let mut samples = [0; CHANNELS];
        self.converter
            .configure(config, Mode::SingleShot)
            .map_err(converter)?;
        self.converter
            .sample_once(&mut samples)
            .map_err(converter)?;
        Ok(samples)
    }

    /// Handle a half- or full-transfer event.
    ///
    /// # Args
    /// * `half` - The half the transfer engine just finished filling.
    pub fn on_transfer_complete(&self, half: Half) -> Handoff {
        let acquisition = self.acquisition;
        if !acquisition.running() {
            return Handoff::Ignored;
        }

        let current = acquisition.current();
        if half != current {
            self.fail(Fault::Desync);
            return Handoff::Desync;
        }
        acquisition.status(current).set_dma(DmaStatus::Done);

        let next = current.other();
        let status = acquisition.status(next);
        if status.store() == StoreStatus::Writing
            || status.dma() == DmaStatus::Done
        {
            self.fail(Fault::Overrun);
            return Handoff::Overrun;
        }

        if acquisition.stop_requested() {
            self.converter.stop();
            acquisition.set_running(false);
            acquisition.set_current(next);
            acquisition.set_finished();
            return Handoff::Finished(current);
        }

        status.set_store(StoreStatus::Waiting);
        status.set_dma(DmaStatus::Active);
        acquisition.set_current(next);
        Handoff::Armed(next)
    }

    /// Handle a transfer bus error. Terminal for the session.
    pub fn on_transfer_error(&self) {
        self.fail(Fault::Transfer);
    }

    fn fail(&self, fault: Fault) {
        self.converter.stop();
        self.acquisition.set_running(false);
        self.acquisition.set_fault(fault);
    }
}

fn converter<E: core::fmt::Debug>(error: E) -> Error {
    log::error!("Converter: {error:?}");
    Error::Converter
}
