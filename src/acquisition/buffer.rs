use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use num_enum::{FromPrimitive, IntoPrimitive};

/// Transfer-engine view of a buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DmaStatus {
    /// Not targeted by the transfer engine and holding no undrained data.
    #[num_enum(default)]
    Inactive = 0,
    /// The transfer engine is (or is about to be) filling this buffer.
    Active = 1,
    /// Filled and waiting for the storage writer.
    Done = 2,
}

/// Storage-writer view of a buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum StoreStatus {
    #[num_enum(default)]
    Waiting = 0,
    /// The writer is reading this buffer. It must not be re-armed.
    Writing = 1,
    Done = 2,
}

/// Status flags of one buffer.
///
/// # Note
/// Every field is a single-byte or word atomic accessed only with plain loads and stores, so the
/// protocol works on cores without compare-and-swap. Stores publish with `Release`, loads observe
/// with `Acquire`.
pub struct BufferStatus {
    dma: AtomicU8,
    store: AtomicU8,
    timestamp: AtomicU32,
}

impl BufferStatus {
    pub(super) const fn new() -> Self {
        Self {
            dma: AtomicU8::new(DmaStatus::Inactive as u8),
            store: AtomicU8::new(StoreStatus::Waiting as u8),
            timestamp: AtomicU32::new(0),
        }
    }

    pub fn dma(&self) -> DmaStatus {
        DmaStatus::from(self.dma.load(Ordering::Acquire))
    }

    pub fn store(&self) -> StoreStatus {
        StoreStatus::from(self.store.load(Ordering::Acquire))
    }

    /// Microsecond timestamp taken when the writer claimed this buffer.
    pub fn timestamp(&self) -> u32 {
        self.timestamp.load(Ordering::Acquire)
    }

    pub(crate) fn set_dma(&self, status: DmaStatus) {
        self.dma.store(status.into(), Ordering::Release);
    }

    pub(crate) fn set_store(&self, status: StoreStatus) {
        self.store.store(status.into(), Ordering::Release);
    }

    pub(crate) fn set_timestamp(&self, timestamp: u32) {
        self.timestamp.store(timestamp, Ordering::Release);
    }

    pub(super) fn clear(&self) {
        self.set_timestamp(0);
        self.set_store(StoreStatus::Waiting);
        self.set_dma(DmaStatus::Inactive);
    }
}
