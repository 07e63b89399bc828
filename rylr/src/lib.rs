//! Text link over a REYAX RYLR LoRa modem
//!
//! # Description
//! The modem is driven over a UART with AT commands. Outgoing text is wrapped in an `AT+SEND`
//! command addressed to a peer. Incoming radio payloads are reported by the modem as
//! unsolicited lines of the form
//!
//! ```text
//! +RCV=<address>,<length>,<payload>,<rssi>,<snr>
//! ```
//!
//! [`Rylr`] accumulates received bytes into lines without blocking and hands back only the
//! payload. Modem status lines such as `+OK` and `+READY` are consumed and dropped.
//!
//! # Example
//! ```ignore
//! let mut link = rylr::Rylr::new(rylr::BestEffortInterface::new(uart), 0, "FS> ");
//! link.send("FIRESIDE SAFE")?;
//! // Sent on the wire: AT+SEND=0,17,FS> FIRESIDE SAFE\r\n
//! if let Some(payload) = link.poll()? {
//!     // e.g. "ARM"
//! }
//! ```
#![cfg_attr(not(test), no_std)]

mod interface;

pub use interface::BestEffortInterface;

use core::fmt::Write as _;
use embedded_io::{ErrorKind, Read, ReadReady, Write};
use heapless::{String, Vec};

/// Largest payload the modem accepts in a single `AT+SEND`.
pub const MAX_PAYLOAD: usize = 240;

/// Longest modem line that is buffered: the payload plus the `+RCV` framing.
const MAX_LINE: usize = MAX_PAYLOAD + 32;

/// A received payload.
pub type Payload = String<MAX_PAYLOAD>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Modem interface: {0:?}")]
    Interface(ErrorKind),
    #[error("Payload of {0} bytes exceeds the modem limit")]
    Oversize(usize),
}

fn interface<E: embedded_io::Error>(error: E) -> Error {
    Error::Interface(error.kind())
}

pub struct Rylr<T> {
    interface: T,
    address: u16,
    header: &'static str,
    line: Vec<u8, MAX_LINE>,
    overflow: bool,
    pending: Option<Payload>,
}

impl<T> Rylr<T>
where
    T: Read + ReadReady + Write,
{
    /// Construct a link.
    ///
    /// # Args
    /// * `interface` - The modem UART.
    /// * `address` - The destination address of outgoing messages. `0` broadcasts.
    /// * `header` - Text prepended to every outgoing message to identify the sender.
    pub fn new(interface: T, address: u16, header: &'static str) -> Self {
        Self {
            interface,
            address,
            header,
            line: Vec::new(),
            overflow: false,
            pending: None,
        }
    }

    /// Transmit one line of text to the peer.
    pub fn send(&mut self, text: &str) -> Result<(), Error> {
        let len = self.header.len() + text.len();
        if len > MAX_PAYLOAD {
            return Err(Error::Oversize(len));
        }

        let mut command: String<{ MAX_LINE }> = String::new();
        write!(
            command,
            "AT+SEND={},{},{}{}\r\n",
            self.address, len, self.header, text
        )
        .map_err(|_| Error::Oversize(len))?;

        self.interface
            .write_all(command.as_bytes())
            .map_err(interface)?;
        self.interface.flush().map_err(interface)
    }

    /// Check whether radio traffic from the peer has arrived.
    ///
    /// Waiting bytes are consumed into the line buffer. Modem status lines such as the `+OK`
    /// acknowledging an `AT+SEND` do not count. A received payload is held for the next
    /// [`Rylr::poll`].
    ///
    /// # Returns
    /// True when a complete payload is held or a `+RCV` line is partially received.
    pub fn available(&mut self) -> Result<bool, Error> {
        if self.pending.is_none() {
            self.pending = self.receive()?;
        }
        Ok(self.pending.is_some() || self.line.starts_with(b"+RCV"))
    }

    /// Consume the bytes that have arrived so far.
    ///
    /// # Returns
    /// The payload of the first complete `+RCV` line, if any. Never blocks: bytes of an
    /// incomplete line are kept for the next call.
    pub fn poll(&mut self) -> Result<Option<Payload>, Error> {
        if let Some(payload) = self.pending.take() {
            return Ok(Some(payload));
        }
        self.receive()
    }

    fn receive(&mut self) -> Result<Option<Payload>, Error> {
        let mut byte = [0u8; 1];
        while self.interface.read_ready().map_err(interface)? {
            if self.interface.read(&mut byte).map_err(interface)? == 0 {
                break;
            }

            if byte[0] != b'\n' {
                if self.line.push(byte[0]).is_err() && !self.overflow {
                    log::warn!("Modem line overflow, discarding");
                    self.overflow = true;
                }
                continue;
            }

            let complete = core::mem::take(&mut self.line);
            if core::mem::take(&mut self.overflow) {
                continue;
            }

            let Ok(text) = core::str::from_utf8(&complete) else {
                log::warn!("Dropping non-UTF-8 modem line");
                continue;
            };

            match received_payload(text) {
                Some(payload) => {
                    // The payload is a strict substring of a bounded line.
                    if let Ok(payload) = Payload::try_from(payload) {
                        return Ok(Some(payload));
                    }
                }
                None => log::debug!("Modem: {}", text.trim()),
            }
        }
        Ok(None)
    }

    /// Drop any partially received line and everything still waiting in the receiver.
    pub fn discard(&mut self) -> Result<(), Error> {
        self.line.clear();
        self.overflow = false;
        self.pending = None;
        let mut buffer = [0u8; 32];
        while self.interface.read_ready().map_err(interface)? {
            if self.interface.read(&mut buffer).map_err(interface)? == 0 {
                break;
            }
        }
        Ok(())
    }

    pub fn interface(&self) -> &T {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut T {
        &mut self.interface
    }
}

/// Extract the payload from a modem line.
///
/// # Returns
/// The trimmed payload of a `+RCV` line, or `None` for any other modem output. The payload may
/// itself contain commas: the address and length fields are stripped from the front and the
/// signal quality fields from the back.
pub fn received_payload(line: &str) -> Option<&str> {
    let fields = line.trim().strip_prefix("+RCV=")?;
    let mut head = fields.splitn(3, ',');
    let (_address, _length, rest) = (head.next()?, head.next()?, head.next()?);
    let mut tail = rest.rsplitn(3, ',');
    let (_snr, _rssi, payload) = (tail.next()?, tail.next()?, tail.next()?);
    Some(payload.trim())
}
