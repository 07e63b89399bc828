//! Igniter output bank
//!
//! A bank is a fixed set of enable lines that are always driven together. The igniter drivers on
//! the FireSide board latch a MOSFET through an inverted stage, so the default polarity is
//! [`Polarity::ActiveLow`]: FIRE drives the line low and SAFE drives it high.
//!
//! # Note
//! Making the bank safe never short-circuits on a failing line. Every line is driven to its safe
//! level and the first failure is reported afterwards.
#![cfg_attr(not(test), no_std)]

use embedded_hal::digital::{self, Error as _, OutputPin};

/// Electrical level that enables an igniter line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// The line fires when driven high.
    ActiveHigh,
    /// The line fires when driven low.
    #[default]
    ActiveLow,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Igniter line {0} could not be driven: {1:?}")]
    Line(usize, digital::ErrorKind),
}

pub struct IgniterBank<P, const N: usize> {
    lines: [P; N],
    polarity: Polarity,
    firing: bool,
}

impl<P: OutputPin, const N: usize> IgniterBank<P, N> {
    /// Take ownership of the enable lines and drive them all safe.
    ///
    /// # Args
    /// * `lines` - The igniter enable lines.
    /// * `polarity` - Level at which a line fires.
    pub fn new(lines: [P; N], polarity: Polarity) -> Result<Self, Error> {
        const { assert!(N > 0) };
        let mut bank = Self {
            lines,
            polarity,
            firing: true,
        };
        bank.safe()?;
        Ok(bank)
    }

    /// Drive every line to its firing level.
    ///
    /// # Note
    /// If any line fails, the whole bank is made safe again before the error is returned.
    pub fn fire(&mut self) -> Result<(), Error> {
        self.firing = true;
        let fire = self.polarity == Polarity::ActiveHigh;
        for index in 0..N {
            if let Err(error) = drive(&mut self.lines[index], fire) {
                self.safe().ok();
                return Err(Error::Line(index, error));
            }
        }
        Ok(())
    }

    /// Drive every line to its safe level.
    pub fn safe(&mut self) -> Result<(), Error> {
        let safe = self.polarity == Polarity::ActiveLow;
        let mut result = Ok(());
        for (index, line) in self.lines.iter_mut().enumerate() {
            if let Err(error) = drive(line, safe) {
                log::error!("Igniter line {index} stuck: {error:?}");
                result = result.and(Err(Error::Line(index, error)));
            }
        }

        // A line that could not be made safe may still be enabled.
        self.firing = result.is_err();
        result
    }

    /// Whether any line may currently be at its firing level.
    pub fn is_firing(&self) -> bool {
        self.firing
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Give the lines back. They are left at whatever level they were last driven to.
    pub fn release(self) -> [P; N] {
        self.lines
    }
}

fn drive<P: OutputPin>(
    line: &mut P,
    high: bool,
) -> Result<(), digital::ErrorKind> {
    let result = if high { line.set_high() } else { line.set_low() };
    result.map_err(|e| e.kind())
}
