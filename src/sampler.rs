//! Sample acquisition and hand-off between interrupt and main contexts
//!
//! The acquisition side calls [`Sampler::on_conversion`] once per completed
//! ADC conversion. It oversamples, applies deferred channel changes and
//! queues finished samples. The processing side drains whole batches with
//! [`Sampler::drain`] and requests sensor changes with
//! [`Sampler::request_channel`].
//!
//! All state touched by both sides lives behind a single critical-section
//! mutex. Critical sections only copy or reset a handful of words, so they
//! never stall a conversion for long.

use core::cell::RefCell;

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    signal::Signal,
};
use heapless::Vec;

use crate::sample::{Channel, Millis, Sample};

/// Maximum number of samples waiting for the main loop
pub const BATCH_CAPACITY: usize = 72;
/// Conversions averaged into one sample
pub const OVERSAMPLE: u32 = 256;
/// Largest factor whose sum of full-scale readings still fits the accumulator
pub const MAX_OVERSAMPLE: u32 = u32::MAX / u16::MAX as u32;

/// Samples drained in one go, in acquisition order
pub type Batch = Vec<Sample, BATCH_CAPACITY>;

/// Hardware multiplexer in front of the ADC
pub trait ChannelMux {
    /// Channel the next conversion will read
    fn configured(&self) -> Channel;
    /// Route the given sensor to the ADC
    fn select(&mut self, channel: Channel);
}

/// What a single conversion did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Conversion {
    /// The multiplexer was switched; the conversion was discarded
    Switched(Channel),
    /// Added to the running sum
    Accumulating,
    /// A sample was completed and queued
    Emitted(Sample),
    /// A sample was completed but the queue was full
    Dropped(Sample),
}

/// Running oversampling sum
#[derive(Default)]
struct Accumulator {
    sum: u32,
    count: u32,
}

struct Shared {
    requested: Channel,
    queue: Batch,
    accumulator: Accumulator,
}

/// Shared acquisition state
pub struct Sampler {
    shared: Mutex<CriticalSectionRawMutex, RefCell<Shared>>,
    /// Raised whenever a sample is queued
    ready: Signal<CriticalSectionRawMutex, ()>,
    oversample: u32,
}

impl Sampler {
    /// Create a sampler averaging `oversample` conversions per sample,
    /// clamped to `1..=MAX_OVERSAMPLE`. Starts on the primary channel.
    pub const fn new(oversample: u32) -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                requested: Channel::Primary,
                queue: Vec::new(),
                accumulator: Accumulator { sum: 0, count: 0 },
            })),
            ready: Signal::new(),
            oversample: match oversample {
                0 => 1,
                n if n > MAX_OVERSAMPLE => MAX_OVERSAMPLE,
                n => n,
            },
        }
    }

    /// Handle one completed conversion. Called from the acquisition context.
    ///
    /// Never blocks: a full queue drops the new sample. The caller re-arms
    /// the next conversion afterwards.
    pub fn on_conversion<M: ChannelMux>(&self, mux: &mut M, raw: u16, now: Millis) -> Conversion {
        let conversion = self.shared.lock(|shared| {
            let mut shared = shared.borrow_mut();

            if mux.configured() != shared.requested {
                // A conversion in flight cannot change source, so switch here
                let channel = shared.requested;
                mux.select(channel);
                shared.accumulator = Accumulator::default();
                shared.queue.clear();
                return Conversion::Switched(channel);
            }

            let acc = &mut shared.accumulator;
            acc.sum += raw as u32;
            acc.count += 1;
            if acc.count < self.oversample {
                return Conversion::Accumulating;
            }

            let sample = Sample::new(now, (acc.sum / self.oversample) as u16);
            shared.accumulator = Accumulator::default();
            match shared.queue.push(sample) {
                Ok(()) => Conversion::Emitted(sample),
                Err(sample) => Conversion::Dropped(sample),
            }
        });

        match conversion {
            Conversion::Emitted(_) => self.ready.signal(()),
            Conversion::Dropped(sample) => trace!("queue full, dropped sample at {}", sample.timestamp),
            Conversion::Switched(channel) => trace!("ADC switched to {}", channel),
            Conversion::Accumulating => {}
        }
        conversion
    }

    /// Request a different sensor. Any queued samples from the old sensor
    /// are discarded. Returns `false` if `channel` was already requested.
    pub fn request_channel(&self, channel: Channel) -> bool {
        self.shared.lock(|shared| {
            let mut shared = shared.borrow_mut();
            if shared.requested == channel {
                return false;
            }
            shared.requested = channel;
            shared.queue.clear();
            true
        })
    }

    /// Currently requested sensor
    pub fn requested(&self) -> Channel {
        self.shared.lock(|shared| shared.borrow().requested)
    }

    /// Take every queued sample, leaving the queue empty
    pub fn drain(&self) -> Batch {
        self.shared
            .lock(|shared| core::mem::take(&mut shared.borrow_mut().queue))
    }

    /// Wait for the next non-empty batch.
    ///
    /// Cancellation-safe: samples are only taken out of the queue in the
    /// poll that returns them.
    pub async fn wait_batch(&self) -> Batch {
        loop {
            let batch = self.drain();
            if !batch.is_empty() {
                return batch;
            }
            self.ready.wait().await;
        }
    }

    /// Take a single reading from `channel`, then go back to the channel
    /// requested before. The previous channel is restored even if the
    /// returned future is dropped early, so wrap it in a timeout freely.
    pub async fn read_once(&self, channel: Channel) -> Sample {
        let _restore = Restore {
            sampler: self,
            channel: self.requested(),
        };
        self.request_channel(channel);
        self.wait_batch().await[0]
    }
}

/// Puts the previously requested channel back when dropped
struct Restore<'a> {
    sampler: &'a Sampler,
    channel: Channel,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        self.sampler.request_channel(self.channel);
    }
}
