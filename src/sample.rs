//! Sample and channel types shared by the acquisition and processing sides

/// Monotonic millisecond counter. Wraps after ~49 days.
pub type Millis = u32;

/// One oversampled ADC reading
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// Time the sample was completed, in ms
    pub timestamp: Millis,
    /// Averaged raw reading
    pub value: u16,
}

impl Sample {
    pub const fn new(timestamp: Millis, value: u16) -> Self {
        Self { timestamp, value }
    }
}

/// Physical sensor selected for conversion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Photodiode (heartbeat)
    Primary,
    /// Photoresistor behind the cuvette (glucose)
    Secondary,
}

impl Channel {
    /// The channel polled after this one in automatic detection
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

/// Milliseconds from `since` to `now`.
///
/// Tolerates counter wraparound. Returns 0 when `now` lies before `since`,
/// which happens for samples completed just before a detector was reset.
pub fn elapsed(since: Millis, now: Millis) -> u32 {
    let diff = now.wrapping_sub(since);
    if diff > i32::MAX as u32 {
        0
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_plain() {
        assert_eq!(elapsed(1_000, 1_250), 250);
        assert_eq!(elapsed(5, 5), 0);
    }

    #[test]
    fn elapsed_across_wraparound() {
        assert_eq!(elapsed(u32::MAX - 99, 100), 200);
    }

    #[test]
    fn elapsed_clamps_when_now_is_earlier() {
        assert_eq!(elapsed(2_000, 1_990), 0);
    }

    #[test]
    fn channel_toggles() {
        assert_eq!(Channel::Primary.other(), Channel::Secondary);
        assert_eq!(Channel::Secondary.other().other(), Channel::Secondary);
    }
}
