//! Photodiode and photoresistor on the SAADC
//!
//! Both sensors are converted in one scan. The multiplexer only decides which
//! of the two results is handed to the sampler.

use biosense::{sampler::ChannelMux, Channel};
use embassy_nrf::saadc::Saadc;

/// Scan slot of each sensor, in the order the channels are configured
const fn slot(channel: Channel) -> usize {
    match channel {
        Channel::Primary => 0,
        Channel::Secondary => 1,
    }
}

pub struct SensorMux {
    selected: Channel,
}

impl ChannelMux for SensorMux {
    fn configured(&self) -> Channel {
        self.selected
    }

    fn select(&mut self, channel: Channel) {
        self.selected = channel;
    }
}

pub struct Sensors<'a> {
    saadc: Saadc<'a, 2>,
    mux: SensorMux,
}

impl<'a> Sensors<'a> {
    /// Calibrate the ADC and start on the photodiode
    pub async fn init(saadc: Saadc<'a, 2>) -> Self {
        saadc.calibrate().await;
        Self {
            saadc,
            mux: SensorMux {
                selected: Channel::Primary,
            },
        }
    }

    /// Run one scan and return the raw reading of the selected sensor
    pub async fn convert(&mut self) -> u16 {
        let mut buf = [0i16; 2];
        self.saadc.sample(&mut buf).await;
        // Single-ended readings can dip slightly below zero
        buf[slot(self.mux.selected)].max(0) as u16
    }

    pub fn mux(&mut self) -> &mut SensorMux {
        &mut self.mux
    }
}
