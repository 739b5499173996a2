//! Debounced active-low inputs (mode button, spot read selector)

use debouncr::{debounce_2, Debouncer, Edge, Repeat2};
use embassy_nrf::gpio::{AnyPin, Input};

pub struct Button<'a> {
    /// Input pin, pulled up and shorted to ground while pressed
    pin: Input<'a, AnyPin>,
    /// Debouncer for the pin level
    debouncer: Debouncer<u8, Repeat2>,
}

impl<'a> Button<'a> {
    /// Configure button on boot
    pub fn init(pin: Input<'a, AnyPin>) -> Self {
        Self {
            pin,
            debouncer: debounce_2(false),
        }
    }

    /// Poll the pin. Returns `true` once per press, after the level was
    /// stable for two consecutive polls.
    pub fn pressed(&mut self) -> bool {
        self.debouncer.update(self.pin.is_low()) == Some(Edge::Rising)
    }
}
