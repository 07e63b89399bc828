//! Igniter and status outputs
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::error::ErrorCode;

/// A set of igniter enable lines switched together.
pub trait Igniters {
    type Error: core::fmt::Debug;

    fn fire(&mut self) -> Result<(), Self::Error>;

    fn safe(&mut self) -> Result<(), Self::Error>;

    /// Whether any line may be at its firing level.
    fn is_firing(&self) -> bool;
}

impl<P: OutputPin, const N: usize> Igniters for igniter::IgniterBank<P, N> {
    type Error = igniter::Error;

    fn fire(&mut self) -> Result<(), Self::Error> {
        igniter::IgniterBank::fire(self)
    }

    fn safe(&mut self) -> Result<(), Self::Error> {
        igniter::IgniterBank::safe(self)
    }

    fn is_firing(&self) -> bool {
        igniter::IgniterBank::is_firing(self)
    }
}

/// The board status light.
pub struct StatusIndicator<P> {
    pin: P,
}

impl<P: OutputPin> StatusIndicator<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn on(&mut self) {
        self.pin.set_high().ok();
    }

    pub fn off(&mut self) {
        self.pin.set_low().ok();
    }

    /// Blink one cycle of `code`: `code` pulses filling one period, then dark for half a period.
    pub fn blink_code(
        &mut self,
        code: ErrorCode,
        period_ms: u32,
        delay: &mut impl DelayNs,
    ) {
        let pulses = u8::from(code).max(1) as u32;
        let step = period_ms / (2 * pulses);
        for _ in 0..pulses {
            self.on();
            delay.delay_ms(step);
            self.off();
            delay.delay_ms(step);
        }
        delay.delay_ms(period_ms / 2);
    }

    /// Signal `code` until power is removed.
    pub fn blink_forever(
        &mut self,
        code: ErrorCode,
        period_ms: u32,
        delay: &mut impl DelayNs,
    ) -> ! {
        log::error!("Halted with error code {}", u8::from(code));
        loop {
            self.blink_code(code, period_ms, delay);
        }
    }

    pub fn release(self) -> P {
        self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Pin, RecordingDelay};

    #[test]
    fn blink_cycle_timing() {
        let pin = Pin::default();
        let mut indicator = StatusIndicator::new(pin.clone());
        let mut delay = RecordingDelay::default();
        indicator.blink_code(ErrorCode::StorageBuffer, 6_000, &mut delay);

        assert_eq!(pin.edges(), 6);
        assert!(!pin.is_high());
        assert_eq!(delay.total_ms(), 9_000);
        assert_eq!(
            delay.calls(),
            [1_000, 1_000, 1_000, 1_000, 1_000, 1_000, 3_000]
        );
    }
}
