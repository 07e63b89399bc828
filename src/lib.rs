//! FireSide igniter controller and flight data logger.
//!
//! The crate is hardware independent. A board support layer provides the analog converter, the
//! storage medium, the radio link and the output lines through the traits in [`acquisition`],
//! [`storage`], [`link`] and [`outputs`], then hands them to [`FireSide`].
#![cfg_attr(not(test), no_std)]

pub mod acquisition;
pub mod channels;
pub mod convert;
pub mod design_parameters;
mod error;
pub mod lifecycle;
pub mod link;
pub mod log_converter;
pub mod outputs;
pub mod settings;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorCode};
pub use lifecycle::{Board, FireSide, Platform, State};
