//! Measurement core of the biosense handheld.
//!
//! The device reads a photodiode (heart rate) and a photoresistor behind a
//! cuvette (glucose) through one ADC. This crate contains everything between
//! the ADC and the character display, independent of the hardware:
//!
//! - [`sampler`]: oversampling, channel switching and batch hand-off from the
//!   acquisition context to the processing loop
//! - [`heartbeat`] and [`glucose`]: the two detectors
//! - [`mode`]: automatic sensor detection and manual mode selection
//! - [`display`]: the character screen the detectors draw on
//!
//! The firmware binary wires these to the nRF52 peripherals.

#![cfg_attr(not(any(test, feature = "testing")), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod display;
pub mod glucose;
pub mod heartbeat;
pub mod mode;
pub mod sample;
pub mod sampler;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::Settings;
pub use mode::{Mode, ModeController};
pub use sample::{Channel, Millis, Sample};
pub use sampler::Sampler;
