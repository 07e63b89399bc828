//! Analog channel layout
use fugit::HertzU32;

use crate::convert::AdcCode;
use crate::design_parameters::{
    ADC_REFERENCE_VOLTS, ADC_RESOLUTION_BITS, CHANNELS, SAMPLE_RATE,
};

/// One block of interleaved samples: `ROWS` rows of `CHANNELS` samples, in scan order.
pub type SampleBlock<const CHANNELS: usize, const ROWS: usize> =
    [[u16; CHANNELS]; ROWS];

/// An analog input in the converter scan sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AnalogInput {
    /// Column label used in converted tables and diagnostics.
    pub label: &'static str,
    /// Converter input multiplexer channel.
    pub channel: u8,
}

/// The converter scan configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChannelConfig<const CHANNELS: usize> {
    /// Inputs in scan (and therefore storage) order.
    pub inputs: [AnalogInput; CHANNELS],
    pub resolution_bits: u8,
    pub reference_volts: f32,
    /// Rate of complete rows.
    pub sample_rate: HertzU32,
}

impl<const CHANNELS: usize> ChannelConfig<CHANNELS> {
    pub fn labels(&self) -> [&'static str; CHANNELS] {
        core::array::from_fn(|i| self.inputs[i].label)
    }

    pub fn volts(&self, code: AdcCode) -> f32 {
        code.volts(self.resolution_bits, self.reference_volts)
    }

    pub fn with_sample_rate(self, sample_rate: HertzU32) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }
}

const fn input(label: &'static str, channel: u8) -> AnalogInput {
    AnalogInput { label, channel }
}

/// The FireSide board scan: eight single-ended inputs, 12 bit, 3.3 V reference.
pub const FIRESIDE: ChannelConfig<CHANNELS> = ChannelConfig {
    inputs: [
        input("A0", 0),
        input("A1", 1),
        input("A2", 2),
        input("A3", 3),
        input("A4", 4),
        input("A5", 5),
        input("A6", 6),
        input("A7", 7),
    ],
    resolution_bits: ADC_RESOLUTION_BITS,
    reference_volts: ADC_REFERENCE_VOLTS,
    sample_rate: SAMPLE_RATE,
};
