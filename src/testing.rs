//! In-memory stand-ins for the board peripherals.
use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_io::{
    ErrorKind, ErrorType, Read, ReadReady, Seek, SeekFrom, Write,
};
use fugit::HertzU32;

use crate::acquisition::{Converter, DmaRegion, Half, Mode};
use crate::channels::{AnalogInput, ChannelConfig};
use crate::lifecycle::Platform;
use crate::design_parameters::LINK_HEADER;
use crate::link::{Line, Link};
use crate::storage::{Clock, Instant, LogFile, Storage};

const LABELS: [&str; 8] = ["A0", "A1", "A2", "A3", "A4", "A5", "A6", "A7"];

/// A 12 bit, 3.3 V scan of the first `C` inputs at 1 kHz.
pub fn config<const C: usize>() -> ChannelConfig<C> {
    ChannelConfig {
        inputs: core::array::from_fn(|i| AnalogInput {
            label: LABELS[i],
            channel: i as u8,
        }),
        resolution_bits: 12,
        reference_volts: 3.3,
        sample_rate: HertzU32::from_raw(1_000),
    }
}

/// Encode one log record with samples from `sample(row, channel)`.
pub fn record<const C: usize, const R: usize>(
    timestamp: u32,
    sample: impl Fn(usize, usize) -> u16,
) -> Vec<u8> {
    let mut bytes = timestamp.to_le_bytes().to_vec();
    for row in 0..R {
        for channel in 0..C {
            bytes.extend_from_slice(&sample(row, channel).to_le_bytes());
        }
    }
    bytes
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemError;

impl embedded_io::Error for MemError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// A file backed by a shared byte vector.
#[derive(Default)]
pub struct MemFile {
    data: Rc<RefCell<Vec<u8>>>,
    position: usize,
    closed: Rc<Cell<bool>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemFile {
    pub fn data(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }
}

impl From<&[u8]> for MemFile {
    fn from(bytes: &[u8]) -> Self {
        Self {
            data: Rc::new(RefCell::new(bytes.to_vec())),
            ..Default::default()
        }
    }
}

impl ErrorType for MemFile {
    type Error = MemError;
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, MemError> {
        let data = self.data.borrow();
        let start = self.position.min(data.len());
        let len = buf.len().min(data.len() - start);
        buf[..len].copy_from_slice(&data[start..start + len]);
        self.position = start + len;
        Ok(len)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize, MemError> {
        if self.fail_writes.get() {
            return Err(MemError);
        }
        let mut data = self.data.borrow_mut();
        let end = self.position + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[self.position..end].copy_from_slice(buf);
        self.position = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), MemError> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, MemError> {
        let len = self.data.borrow().len() as i64;
        let position = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        if position < 0 {
            return Err(MemError);
        }
        self.position = position as usize;
        Ok(position as u64)
    }
}

impl LogFile for MemFile {
    fn size(&mut self) -> Result<u64, MemError> {
        Ok(self.data.borrow().len() as u64)
    }

    fn close(self) -> Result<(), MemError> {
        self.closed.set(true);
        Ok(())
    }
}

struct Entry {
    data: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
}

/// A flat in-memory directory. Clones share the same files.
#[derive(Clone, Default)]
pub struct MemStorage {
    files: Rc<RefCell<BTreeMap<String, Entry>>>,
    fail_init: Rc<Cell<bool>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemStorage {
    pub fn insert(&self, name: &str, bytes: &[u8]) {
        self.files.borrow_mut().insert(
            name.to_string(),
            Entry {
                data: Rc::new(RefCell::new(bytes.to_vec())),
                closed: Rc::new(Cell::new(true)),
            },
        );
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files
            .borrow()
            .get(name)
            .map(|entry| entry.data.borrow().clone())
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.contents(name)
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    /// Whether the last handle opened on `name` has been closed.
    pub fn closed(&self, name: &str) -> bool {
        self.files
            .borrow()
            .get(name)
            .is_some_and(|entry| entry.closed.get())
    }

    /// Make every write fail, including writes to files already open.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn fail_init(&self, fail: bool) {
        self.fail_init.set(fail);
    }

    fn handle(&self, entry: &Entry) -> MemFile {
        entry.closed.set(false);
        MemFile {
            data: entry.data.clone(),
            position: 0,
            closed: entry.closed.clone(),
            fail_writes: self.fail_writes.clone(),
        }
    }
}

impl Storage for MemStorage {
    type Error = MemError;
    type File = MemFile;

    fn init(&mut self) -> Result<(), MemError> {
        if self.fail_init.get() {
            Err(MemError)
        } else {
            Ok(())
        }
    }

    fn create(&mut self, name: &str) -> Result<MemFile, MemError> {
        if self.fail_writes.get() {
            return Err(MemError);
        }
        let entry = Entry {
            data: Rc::default(),
            closed: Rc::default(),
        };
        let file = self.handle(&entry);
        self.files.borrow_mut().insert(name.to_string(), entry);
        Ok(file)
    }

    fn open(&mut self, name: &str) -> Result<MemFile, MemError> {
        let files = self.files.borrow();
        let entry = files.get(name).ok_or(MemError)?;
        Ok(self.handle(entry))
    }

    fn exists(&mut self, name: &str) -> Result<bool, MemError> {
        Ok(self.files.borrow().contains_key(name))
    }
}

#[derive(Debug)]
pub struct SimError;

/// A converter whose transfer engine is driven by the test.
pub struct SimConverter<const C: usize> {
    region: Cell<Option<DmaRegion>>,
    mode: Cell<Option<Mode>>,
    sample_rate: Cell<Option<HertzU32>>,
    levels: Cell<[u16; C]>,
    running: Cell<bool>,
    fail_start: Cell<bool>,
    fail_configure: Cell<bool>,
}

impl<const C: usize> SimConverter<C> {
    pub fn new() -> Self {
        Self {
            region: Cell::new(None),
            mode: Cell::new(None),
            sample_rate: Cell::new(None),
            levels: Cell::new([0; C]),
            running: Cell::new(false),
            fail_start: Cell::new(false),
            fail_configure: Cell::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode.get()
    }

    /// Row rate of the last continuous configuration.
    pub fn sample_rate(&self) -> Option<HertzU32> {
        self.sample_rate.get()
    }

    /// Codes returned by single scans.
    pub fn set_levels(&self, levels: [u16; C]) {
        self.levels.set(levels);
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.set(fail);
    }

    pub fn fail_configure(&self, fail: bool) {
        self.fail_configure.set(fail);
    }

    /// Write `value` into every sample of `half`, as the transfer engine would.
    pub fn fill(&self, half: Half, value: u16) {
        let region = self.region.get().expect("transfer engine not armed");
        let offset = match half {
            Half::Lower => 0,
            Half::Upper => region.half_len(),
        };
        // Note(unsafe): The region outlives the converter in every test and the half is not
        // borrowed by the writer while it is being filled.
        let samples = unsafe {
            core::slice::from_raw_parts_mut(
                region.address.add(offset),
                region.half_len(),
            )
        };
        samples.fill(value);
    }
}

impl<const C: usize> Converter<C> for SimConverter<C> {
    type Error = SimError;

    fn configure(
        &self,
        config: &ChannelConfig<C>,
        mode: Mode,
    ) -> Result<(), SimError> {
        if self.fail_configure.get() {
            return Err(SimError);
        }
        self.mode.set(Some(mode));
        if mode == Mode::Continuous {
            self.sample_rate.set(Some(config.sample_rate));
        }
        Ok(())
    }

    fn arm_circular(&self, region: DmaRegion) -> Result<(), SimError> {
        self.region.set(Some(region));
        Ok(())
    }

    fn start(&self) -> Result<(), SimError> {
        if self.fail_start.get() || self.region.get().is_none() {
            return Err(SimError);
        }
        self.running.set(true);
        Ok(())
    }

    fn stop(&self) {
        self.running.set(false);
    }

    fn sample_once(&self, samples: &mut [u16; C]) -> Result<(), SimError> {
        *samples = self.levels.get();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u32>>);

impl ManualClock {
    pub fn set(&self, micros: u32) {
        self.0.set(micros);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.0.get())
    }
}

/// An output line that remembers its level and counts how often it was driven.
#[derive(Clone, Default)]
pub struct Pin {
    level: Rc<Cell<bool>>,
    edges: Rc<Cell<usize>>,
}

impl Pin {
    pub fn is_high(&self) -> bool {
        self.level.get()
    }

    pub fn edges(&self) -> usize {
        self.edges.get()
    }

    fn drive(&self, high: bool) {
        self.level.set(high);
        self.edges.set(self.edges.get() + 1);
    }
}

impl digital::ErrorType for Pin {
    type Error = Infallible;
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }
}

/// A delay that returns immediately and records each millisecond request.
#[derive(Clone, Default)]
pub struct RecordingDelay(Rc<RefCell<Vec<u32>>>);

impl RecordingDelay {
    pub fn calls(&self) -> Vec<u32> {
        self.0.borrow().clone()
    }

    pub fn total_ms(&self) -> u32 {
        self.0.borrow().iter().sum()
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.borrow_mut().push(ms);
    }
}

#[derive(Default)]
struct LinkState {
    incoming: VecDeque<String>,
    sent: Vec<String>,
}

/// A ground station that sends queued lines and keeps everything it receives.
#[derive(Clone, Default)]
pub struct ScriptLink(Rc<RefCell<LinkState>>);

impl ScriptLink {
    pub fn push(&self, line: &str) {
        self.0.borrow_mut().incoming.push_back(line.to_string());
    }

    /// Whether any line sent so far contains `text`.
    pub fn sent_contains(&self, text: &str) -> bool {
        self.0.borrow().sent.iter().any(|line| line.contains(text))
    }
}

impl Link for ScriptLink {
    type Error = Infallible;

    fn available(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow().incoming.is_empty())
    }

    fn poll_line(&mut self) -> Result<Option<Line>, Infallible> {
        let line = self.0.borrow_mut().incoming.pop_front();
        Ok(line.map(|line| Line::try_from(line.as_str()).unwrap()))
    }

    fn write_line(&mut self, text: &str) -> Result<(), Infallible> {
        self.0.borrow_mut().sent.push(text.to_string());
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().incoming.clear();
        Ok(())
    }
}

#[derive(Default)]
struct ModemState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    acks: usize,
}

/// A RYLR modem UART. Every `AT+SEND` is acknowledged with `+OK` once
/// [`ModemUart::deliver_acks`] lets the replies through.
#[derive(Clone, Default)]
pub struct ModemUart(Rc<RefCell<ModemState>>);

impl ModemUart {
    pub fn link(&self) -> rylr::Rylr<ModemUart> {
        rylr::Rylr::new(self.clone(), 0, LINK_HEADER)
    }

    /// A payload radioed by the ground station.
    pub fn receive(&self, payload: &str) {
        let line = format!("+RCV=0,{},{payload},-40,10\r\n", payload.len());
        self.0.borrow_mut().rx.extend(line.bytes());
    }

    pub fn deliver_acks(&self) {
        let mut state = self.0.borrow_mut();
        for _ in 0..core::mem::take(&mut state.acks) {
            state.rx.extend(b"+OK\r\n");
        }
    }

    pub fn sent_contains(&self, text: &str) -> bool {
        String::from_utf8_lossy(&self.0.borrow().tx).contains(text)
    }
}

impl ErrorType for ModemUart {
    type Error = Infallible;
}

impl Read for ModemUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let mut state = self.0.borrow_mut();
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl ReadReady for ModemUart {
    fn read_ready(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow().rx.is_empty())
    }
}

impl Write for ModemUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        let mut state = self.0.borrow_mut();
        if buf.starts_with(b"AT+SEND") {
            state.acks += 1;
        }
        state.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

pub struct TestPlatform;

impl Platform for TestPlatform {
    type Storage = MemStorage;
    type Link = ScriptLink;
    type Igniters = igniter::IgniterBank<Pin, 2>;
    type Indicator = Pin;
    type Clock = ManualClock;
    type Delay = RecordingDelay;
}

/// [`TestPlatform`] talking through a RYLR modem.
pub struct RadioPlatform;

impl Platform for RadioPlatform {
    type Storage = MemStorage;
    type Link = rylr::Rylr<ModemUart>;
    type Igniters = igniter::IgniterBank<Pin, 2>;
    type Indicator = Pin;
    type Clock = ManualClock;
    type Delay = RecordingDelay;
}
