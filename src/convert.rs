/// A type representing a raw ADC sample.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AdcCode(pub u16);

impl AdcCode {
    /// Convert the code to volts for a converter with the given resolution and reference.
    ///
    /// # Args
    /// * `bits` - Converter resolution. Codes span `0..2^bits`.
    /// * `reference` - Reference voltage in volts.
    pub fn volts(self, bits: u8, reference: f32) -> f32 {
        self.0 as f32 * reference / (1u32 << bits) as f32
    }
}

impl From<u16> for AdcCode {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<AdcCode> for u16 {
    fn from(code: AdcCode) -> u16 {
        code.0
    }
}
