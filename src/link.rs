//! Command and telemetry link
use embedded_io::{Read, ReadReady, Write};

use crate::design_parameters::LINK_HEADER;

/// One received line of text.
pub type Line = heapless::String<{ rylr::MAX_PAYLOAD }>;

/// One outgoing line of telemetry.
pub type Text = heapless::String<{ rylr::MAX_PAYLOAD - LINK_HEADER.len() }>;

/// Operator commands.
///
/// Matching is exact and case-sensitive. Anything else parses as [`Command::Unknown`].
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Command {
    Safe,
    Arm,
    Launch,
    Convert,
    #[strum(disabled)]
    Unknown,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        text.trim().parse().unwrap_or(Self::Unknown)
    }
}

/// A bidirectional line-oriented text channel to the ground station.
pub trait Link {
    type Error: core::fmt::Debug;

    /// Whether any input is waiting, complete line or not.
    fn available(&mut self) -> Result<bool, Self::Error>;

    /// Return the next complete line if one has arrived. Never blocks.
    fn poll_line(&mut self) -> Result<Option<Line>, Self::Error>;

    fn write_line(&mut self, text: &str) -> Result<(), Self::Error>;

    /// Drop all pending input.
    fn discard_input(&mut self) -> Result<(), Self::Error>;
}

impl<T> Link for rylr::Rylr<T>
where
    T: Read + ReadReady + Write,
{
    type Error = rylr::Error;

    fn available(&mut self) -> Result<bool, Self::Error> {
        rylr::Rylr::available(self)
    }

    fn poll_line(&mut self) -> Result<Option<Line>, Self::Error> {
        self.poll()
    }

    fn write_line(&mut self, text: &str) -> Result<(), Self::Error> {
        self.send(text)
    }

    fn discard_input(&mut self) -> Result<(), Self::Error> {
        self.discard()
    }
}

/// Send a line, logging rather than propagating failures.
pub(crate) fn say<L: Link>(link: &mut L, text: &str) {
    log::info!("> {text}");
    if let Err(e) = link.write_line(text) {
        log::warn!("Telemetry dropped: {e:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        for (text, command) in [
            ("SAFE", Command::Safe),
            ("ARM", Command::Arm),
            (" LAUNCH\r", Command::Launch),
            ("CONVERT", Command::Convert),
            ("arm", Command::Unknown),
            ("", Command::Unknown),
            ("FIRE", Command::Unknown),
            ("Unknown", Command::Unknown),
        ] {
            assert_eq!(Command::parse(text), command, "{text:?}");
        }
        assert_eq!(<&str>::from(Command::Launch), "LAUNCH");
    }
}
