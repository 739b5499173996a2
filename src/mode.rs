//! Operating mode state machine
//!
//! [`transition`] is pure: it only lists what entering a mode requires.
//! [`ModeController`] applies those effects and dispatches drained batches to
//! the detector of the current mode.

use embedded_hal::digital::OutputPin;
use heapless::Vec;

use crate::{
    config::Settings,
    display::{CellWriter, Screen},
    glucose::{GlucoseDetector, Reading},
    heartbeat::{HeartbeatDetector, Step},
    sample::{elapsed, Channel, Millis, Sample},
    sampler::Sampler,
};

/// Sensor read while measuring heart rate
pub const HEARTBEAT_CHANNEL: Channel = Channel::Primary;
/// Sensor read while measuring glucose
pub const GLUCOSE_CHANNEL: Channel = Channel::Secondary;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Poll both sensors until one of them sees something
    #[default]
    Auto,
    Heartbeat,
    Glucose,
}

impl Mode {
    /// Next mode for the manual override
    pub fn next(self) -> Self {
        match self {
            Self::Auto => Self::Heartbeat,
            Self::Heartbeat => Self::Glucose,
            Self::Glucose => Self::Auto,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Auto => "Automatic",
            Self::Heartbeat => "Heartbeat",
            Self::Glucose => "Glucose",
        }
    }

    fn header(self) -> &'static str {
        match self {
            Self::Auto => "- Automatic -",
            Self::Heartbeat => "- Heartbeat -",
            Self::Glucose => "- Glucose -",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Alert {
    pub title: &'static str,
    pub subtitle: Option<&'static str>,
}

impl Alert {
    /// Shown when a detector gave up waiting for the user
    pub const INACTIVITY: Self = Self {
        title: "User Inactivity",
        subtitle: Some("Return to auto"),
    };
}

/// Side effect of entering a mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    ResetHeartbeat,
    ResetGlucose,
    RequestChannel(Channel),
    ShowAlert(Alert),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub mode: Mode,
    /// Entered because the user stopped measuring, not by request
    pub inactivity: bool,
    /// To be applied in order
    pub effects: Vec<Effect, 3>,
}

/// Everything that has to happen to enter `mode`
pub fn transition(mode: Mode, inactivity: bool) -> Transition {
    let mut effects = Vec::new();
    match mode {
        // Auto alternates channels itself
        Mode::Auto => {}
        Mode::Heartbeat => effects.extend([Effect::ResetHeartbeat, Effect::RequestChannel(HEARTBEAT_CHANNEL)]),
        Mode::Glucose => effects.extend([Effect::ResetGlucose, Effect::RequestChannel(GLUCOSE_CHANNEL)]),
    }

    let alert = if inactivity {
        Alert::INACTIVITY
    } else {
        Alert {
            title: mode.label(),
            subtitle: None,
        }
    };
    effects.extend([Effect::ShowAlert(alert)]);

    Transition {
        mode,
        inactivity,
        effects,
    }
}

/// Owns the detectors and the screen and decides who gets each batch
pub struct ModeController<'a, W, L> {
    sampler: &'a Sampler,
    screen: Screen<W>,
    led: L,
    settings: Settings,
    mode: Mode,
    heartbeat: HeartbeatDetector,
    glucose: GlucoseDetector,
    /// When the current alert went up
    alert_since: Option<Millis>,
}

impl<'a, W, L> ModeController<'a, W, L>
where
    W: CellWriter,
    L: OutputPin,
{
    pub fn new(sampler: &'a Sampler, screen: Screen<W>, led: L, settings: Settings) -> Self {
        Self {
            sampler,
            screen,
            led,
            mode: Mode::Auto,
            heartbeat: HeartbeatDetector::new(settings.heartbeat),
            glucose: GlucoseDetector::new(settings.glucose),
            settings,
            alert_since: None,
        }
    }

    /// Power-up: enter automatic detection
    pub fn start(&mut self, now: Millis) {
        self.enter(Mode::Auto, false, now);
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn screen(&self) -> &Screen<W> {
        &self.screen
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    pub fn heartbeat(&self) -> &HeartbeatDetector {
        &self.heartbeat
    }

    pub fn glucose(&self) -> &GlucoseDetector {
        &self.glucose
    }

    pub fn enter(&mut self, mode: Mode, inactivity: bool, now: Millis) {
        let transition = transition(mode, inactivity);
        info!("entering {} (inactivity: {})", transition.mode, transition.inactivity);
        self.mode = transition.mode;

        for effect in transition.effects {
            match effect {
                Effect::ResetHeartbeat => self.reset_heartbeat(now),
                Effect::ResetGlucose => self.glucose.reset(now),
                Effect::RequestChannel(channel) => {
                    self.sampler.request_channel(channel);
                }
                Effect::ShowAlert(alert) => {
                    self.screen.clear();
                    if self.screen.draw_alert(alert.title, alert.subtitle) {
                        self.alert_since = Some(now);
                    }
                }
            }
        }
    }

    /// Hand a drained batch to the current mode. Ignored while an alert is up.
    pub fn process_batch(&mut self, batch: &[Sample], now: Millis) {
        let Some(&first) = batch.first() else {
            return;
        };
        if !self.screen.can_draw() {
            return;
        }

        match self.mode {
            Mode::Auto => self.detect(first, now),
            Mode::Heartbeat => {
                for &sample in batch {
                    let step = self.heartbeat.consume(sample, &mut self.screen, &mut self.led);
                    if step == Step::Inactive {
                        info!("no heartbeat, returning to auto");
                        self.reset_heartbeat(now);
                        self.enter(Mode::Auto, true, now);
                        break;
                    }
                }
            }
            Mode::Glucose => {
                if self.glucose.consume(first, now, &mut self.screen) == Reading::TimedOut {
                    info!("no cuvette, returning to auto");
                    self.glucose.reset(now);
                    self.enter(Mode::Auto, true, now);
                }
            }
        }
    }

    /// Manual mode change. Refused while an alert is up.
    pub fn request_next_mode(&mut self, now: Millis) -> bool {
        if !self.screen.can_draw() {
            debug!("mode change ignored, alert visible");
            return false;
        }
        self.enter(self.mode.next(), false, now);
        true
    }

    /// Take down an expired alert and draw the mode screen
    pub fn poll(&mut self, now: Millis) {
        let Some(since) = self.alert_since else {
            return;
        };
        if elapsed(since, now) < self.settings.alert_duration_ms {
            return;
        }
        self.alert_since = None;

        self.screen.clear();
        self.screen.draw_centered_text(self.mode.header(), 0, 0);
        match self.mode {
            Mode::Auto => {
                self.screen.draw_centered_text("Place finger or", 1, 0);
                self.screen.draw_centered_text("insert cuvette", 2, 0);
            }
            Mode::Heartbeat => self.screen.write_str(0, 1, "Please touch sensor "),
            Mode::Glucose => {}
        }
    }

    /// Render a one-off glucose reading taken outside glucose mode.
    /// `None` means the read timed out.
    pub fn show_spot_reading(&mut self, sample: Option<Sample>) -> Reading {
        let reading = match sample {
            None => Reading::TimedOut,
            Some(sample) if sample.value > self.settings.glucose.no_cuvette_threshold => Reading::NoCuvette,
            Some(sample) => match self.glucose.calibration().concentration(sample.value) {
                Ok(conc) => Reading::Concentration(conc),
                Err(_) => Reading::OutOfRange,
            },
        };
        if !self.screen.can_draw() {
            return Reading::Suppressed;
        }

        match reading {
            Reading::Concentration(conc) => self
                .screen
                .write_fmt(0, 2, format_args!("Spot: {:.2}mM        ", conc)),
            Reading::NoCuvette => self.screen.write_str(0, 2, "Spot: no cuvette    "),
            Reading::OutOfRange => self.screen.write_str(0, 2, "Spot: out of range  "),
            _ => self.screen.write_str(0, 2, "Spot: no reading    "),
        }
        reading
    }

    fn reset_heartbeat(&mut self, now: Millis) {
        self.heartbeat.reset(now);
        let _ = self.led.set_low();
    }

    /// Automatic detection on the first sample of a batch
    fn detect(&mut self, sample: Sample, now: Millis) {
        let detection = self.settings.detection;
        let channel = self.sampler.requested();
        match channel {
            HEARTBEAT_CHANNEL if sample.value < detection.heartbeat_threshold => {
                self.enter(Mode::Heartbeat, false, now)
            }
            GLUCOSE_CHANNEL if sample.value < detection.glucose_threshold => self.enter(Mode::Glucose, false, now),
            _ => {
                self.sampler.request_channel(channel.other());
            }
        }
    }
}
