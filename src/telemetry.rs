use core::fmt::Write as _;
use heapless::String;

use crate::channels::ChannelConfig;
use crate::convert::AdcCode;
use crate::Error;

/// Raw codes from one diagnostic scan of every channel.
///
/// # Note
/// Codes are converted to volts only when the readout is reported.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChannelReadout<const CHANNELS: usize> {
    pub codes: [AdcCode; CHANNELS],
}

impl<const CHANNELS: usize> ChannelReadout<CHANNELS> {
    pub fn new(samples: [u16; CHANNELS]) -> Self {
        Self {
            codes: samples.map(AdcCode),
        }
    }

    /// Convert the readout to volts.
    ///
    /// # Args
    /// * `config` - The scan configuration the codes were captured with.
    pub fn finalize(
        &self,
        config: &ChannelConfig<CHANNELS>,
    ) -> [f32; CHANNELS] {
        self.codes.map(|code| config.volts(code))
    }

    /// Render the readout as one line, e.g. `A0=1.650V A1=0.003V`.
    pub fn render<const N: usize>(
        &self,
        config: &ChannelConfig<CHANNELS>,
    ) -> Result<String<N>, Error> {
        let mut line = String::new();
        for (input, volts) in config.inputs.iter().zip(self.finalize(config)) {
            if !line.is_empty() {
                line.push(' ').map_err(|_| Error::Format)?;
            }
            write!(line, "{}={:.3}V", input.label, volts)?;
        }
        Ok(line)
    }
}
