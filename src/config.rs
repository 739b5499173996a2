//! Measurement settings
//!
//! Raw thresholds are in 10-bit ADC units after oversampling.

use crate::glucose::Calibration;

/// Heartbeat peak detection
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatConfig {
    /// Drop (or rise) from the running extremum that confirms a reversal
    pub hysteresis: u16,
    /// Shortest accepted time between two peaks (250 ms = 240 BPM)
    pub min_beat_interval_ms: u32,
    /// No beat for this long means the finger was removed
    pub no_finger_ms: u32,
    /// No beat for this long returns to automatic mode
    pub inactivity_ms: u32,
    /// Minimum time between waveform redraws
    pub redraw_interval_ms: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            hysteresis: 100,
            min_beat_interval_ms: 250,
            no_finger_ms: 2_000,
            inactivity_ms: 10_000,
            redraw_interval_ms: 50,
        }
    }
}

/// Glucose reading
#[derive(Clone, Copy, Debug)]
pub struct GlucoseConfig {
    /// Readings above this mean no cuvette is inserted
    pub no_cuvette_threshold: u16,
    /// Time without a cuvette before returning to automatic mode
    pub inactivity_ms: u32,
    pub calibration: Calibration,
}

impl Default for GlucoseConfig {
    fn default() -> Self {
        Self {
            no_cuvette_threshold: 170,
            inactivity_ms: 10_000,
            calibration: Calibration::DEFAULT,
        }
    }
}

/// Automatic sensor detection
#[derive(Clone, Copy, Debug)]
pub struct DetectionConfig {
    /// Photodiode reading below which a finger covers the sensor
    pub heartbeat_threshold: u16,
    /// Photoresistor reading below which a cuvette is inserted
    pub glucose_threshold: u16,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_threshold: 10,
            glucose_threshold: 150,
        }
    }
}

/// Complete device settings
#[derive(Clone, Copy, Debug)]
pub struct Settings {
    pub heartbeat: HeartbeatConfig,
    pub glucose: GlucoseConfig,
    pub detection: DetectionConfig,
    /// How long a mode alert stays on screen
    pub alert_duration_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            glucose: GlucoseConfig::default(),
            detection: DetectionConfig::default(),
            alert_duration_ms: 2_000,
        }
    }
}
