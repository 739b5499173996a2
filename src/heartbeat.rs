//! Heart rate from the photodiode waveform
//!
//! A two-phase peak/trough tracker with hysteresis. Each measured peak
//! yields an instantaneous BPM value that goes into a fixed ring; the
//! displayed heart rate is the mean of that ring. Everything is integer
//! arithmetic.
//!
//! A reversal only counts once the waveform has moved `hysteresis` units away
//! from the running extremum. Candidates are then validated:
//!
//! - peaks closer than `min_beat_interval_ms` to the previous beat are noise
//! - peaks and troughs whose swing is below 80 % of the previously accepted
//!   swing are noise
//!
//! A rejected candidate is dropped and tracking restarts from the current
//! sample, so the next real extremum can still be found within the same
//! phase.
//!
//! Tracking starts from the first sample after a reset, so a pulse riding
//! on a DC offset is measured against its own trough. The first accepted
//! peak after a reset or a lost finger only becomes the reference for the
//! next one; no interval is measured across the gap.

use embedded_hal::digital::OutputPin;

use crate::{
    config::HeartbeatConfig,
    display::{CellWriter, Glyph, Screen, COLUMNS},
    sample::{elapsed, Millis, Sample},
};

/// Number of beats averaged for the displayed heart rate
pub const HISTORY_LEN: usize = 10;

/// Initial waveform range for the bar graph
const GRAPH_MIN: u16 = 20;
const GRAPH_MAX: u16 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Rising,
    Falling,
}

/// Result of feeding one sample
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Nothing noteworthy
    Idle,
    /// Peak accepted; instantaneous BPM
    Beat(u16),
    /// Peak accepted with no previous peak to measure from
    Peak,
    /// Peak or trough candidate rejected as noise
    Rejected,
    /// Trough accepted
    Trough,
    /// No beat within the inactivity window
    Inactive,
}

pub struct HeartbeatDetector {
    config: HeartbeatConfig,
    phase: Phase,
    /// Extremes start from the first sample after a reset
    primed: bool,
    /// Lowest value since the last accepted peak
    cycle_min: u16,
    /// Highest value since the last accepted trough (or rejected candidate)
    cycle_max: u16,
    /// Graph range
    last_min: u16,
    last_max: u16,
    /// Swing of the last accepted peak and trough
    last_peak_margin: u16,
    last_trough_margin: u16,
    last_peak_time: Millis,
    /// `last_peak_time` is a peak of the current finger placement
    has_reference: bool,
    /// Time of `cycle_max`
    candidate_time: Millis,
    history: [u16; HISTORY_LEN],
    history_pos: usize,
    has_finger: bool,
    last_redraw: Millis,
}

impl HeartbeatDetector {
    pub fn new(config: HeartbeatConfig) -> Self {
        let mut detector = Self {
            config,
            phase: Phase::Rising,
            primed: false,
            cycle_min: 0,
            cycle_max: 0,
            last_min: GRAPH_MIN,
            last_max: GRAPH_MAX,
            last_peak_margin: 0,
            last_trough_margin: 0,
            last_peak_time: 0,
            has_reference: false,
            candidate_time: 0,
            history: [0; HISTORY_LEN],
            history_pos: 0,
            has_finger: false,
            last_redraw: 0,
        };
        detector.reset(0);
        detector
    }

    /// Forget everything and start measuring at `now`
    pub fn reset(&mut self, now: Millis) {
        self.phase = Phase::Rising;
        self.primed = false;
        self.cycle_min = 0;
        self.cycle_max = 0;
        self.last_min = GRAPH_MIN;
        self.last_max = GRAPH_MAX;
        self.last_peak_margin = 0;
        self.last_trough_margin = 0;
        self.last_peak_time = now;
        self.has_reference = false;
        self.candidate_time = now;
        self.history = [0; HISTORY_LEN];
        self.history_pos = 0;
        self.has_finger = false;
        self.last_redraw = now;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether a beat has been found since the finger was last lost
    pub fn has_finger(&self) -> bool {
        self.has_finger
    }

    pub fn history(&self) -> &[u16; HISTORY_LEN] {
        &self.history
    }

    /// Smoothed heart rate
    pub fn average_bpm(&self) -> u16 {
        let sum: u32 = self.history.iter().map(|&bpm| bpm as u32).sum();
        (sum / HISTORY_LEN as u32) as u16
    }

    /// Feed one sample, updating the heart rate line, the phase indicator
    /// and the waveform graph.
    pub fn consume<W, L>(&mut self, sample: Sample, screen: &mut Screen<W>, led: &mut L) -> Step
    where
        W: CellWriter,
        L: OutputPin,
    {
        let step = if !self.primed {
            self.primed = true;
            self.cycle_min = sample.value;
            self.cycle_max = sample.value;
            self.candidate_time = sample.timestamp;
            Step::Idle
        } else {
            match self.phase {
                Phase::Rising => self.rising(sample, screen, led),
                Phase::Falling => self.falling(sample, screen, led),
            }
        };

        if self.check_liveness(sample, screen) {
            Step::Inactive
        } else {
            step
        }
    }

    fn rising<W: CellWriter, L: OutputPin>(&mut self, sample: Sample, screen: &mut Screen<W>, led: &mut L) -> Step {
        let Sample { timestamp: now, value: val } = sample;

        if val > self.cycle_max {
            self.cycle_max = val;
            self.candidate_time = now;
            return Step::Idle;
        }
        self.cycle_min = self.cycle_min.min(val);
        if val.saturating_add(self.config.hysteresis) >= self.cycle_max {
            return Step::Idle;
        }

        // Dropped far enough below the maximum: that was a peak
        let margin = self.cycle_max.saturating_sub(self.cycle_min);
        let interval = elapsed(self.last_peak_time, self.candidate_time);
        let measured = self.has_reference && interval <= self.config.no_finger_ms;
        if (measured && interval <= self.config.min_beat_interval_ms) || margin <= fraction(self.last_peak_margin) {
            debug!("peak rejected, interval: {}ms margin: {}", interval, margin);
            self.cycle_max = val;
            self.candidate_time = now;
            return Step::Rejected;
        }

        self.phase = Phase::Falling;
        self.last_max = self.cycle_max.saturating_add(5);
        self.cycle_min = val;
        let _ = led.set_low();
        self.last_peak_time = self.candidate_time;
        self.has_reference = true;
        self.last_peak_margin = margin;

        if !measured {
            debug!("reference peak, margin: {}", margin);
            return Step::Peak;
        }

        let bpm = (60_000 / interval) as u16;
        debug!("peak accepted, margin: {} BPM: {}", margin, bpm);

        if self.has_finger {
            self.history[self.history_pos] = bpm;
        } else {
            // First beat after (re)placing the finger: show it right away
            self.history = [bpm; HISTORY_LEN];
        }
        self.history_pos = (self.history_pos + 1) % HISTORY_LEN;

        if screen.can_draw() {
            if !self.has_finger {
                screen.write_str(0, 1, "                    ");
            }
            screen.write_fmt(0, 1, format_args!("Heart rate: {}BPM  ", self.average_bpm()));
            screen.write_glyph(COLUMNS - 1, 1, Glyph::HeartLarge);
        }
        self.has_finger = true;

        Step::Beat(bpm)
    }

    fn falling<W: CellWriter, L: OutputPin>(&mut self, sample: Sample, screen: &mut Screen<W>, led: &mut L) -> Step {
        let Sample { timestamp: now, value: val } = sample;

        if val < self.cycle_min {
            self.cycle_min = val;
            return Step::Idle;
        }
        self.cycle_max = self.cycle_max.max(val);
        if val <= self.cycle_min.saturating_add(self.config.hysteresis) {
            return Step::Idle;
        }

        let margin = self.cycle_max.saturating_sub(self.cycle_min);
        if margin <= fraction(self.last_trough_margin) {
            debug!("trough rejected, margin: {}", margin);
            self.cycle_min = val;
            return Step::Rejected;
        }

        debug!("trough accepted, margin: {}", margin);
        self.phase = Phase::Rising;
        self.last_min = self.cycle_min;
        self.cycle_max = val;
        self.candidate_time = now;
        self.last_trough_margin = margin;
        let _ = led.set_high();

        if screen.can_draw() {
            screen.write_glyph(COLUMNS - 1, 1, Glyph::HeartSmall);
        }

        Step::Trough
    }

    /// Periodic redraw of the waveform plus finger and inactivity checks.
    /// Returns `true` once no beat was seen for the inactivity window.
    fn check_liveness<W: CellWriter>(&mut self, sample: Sample, screen: &mut Screen<W>) -> bool {
        let now = sample.timestamp;
        if elapsed(self.last_redraw, now) <= self.config.redraw_interval_ms || !screen.can_draw() {
            return false;
        }
        self.last_redraw = now;
        self.draw_graph(sample.value, screen);

        let since_beat = elapsed(self.last_peak_time, now);
        if since_beat > self.config.no_finger_ms && self.has_finger {
            if sample.value == 0 {
                screen.write_str(0, 1, "Reading...");
            } else {
                info!("no beat for {}ms, finger lost", since_beat);
                self.has_finger = false;
                self.has_reference = false;
                // Amplitude may differ when the finger comes back
                self.last_peak_margin = 0;
                self.last_trough_margin = 0;
                screen.write_str(0, 1, "Please touch sensor ");
            }
        }

        since_beat > self.config.inactivity_ms
    }

    fn draw_graph<W: CellWriter>(&self, val: u16, screen: &mut Screen<W>) {
        let span = self.last_max.saturating_sub(self.last_min).max(1) as u32;
        let level = val.saturating_sub(self.last_min) as u32 * COLUMNS as u32 / span;
        for column in 0..COLUMNS {
            if column as u32 <= level {
                screen.write_glyph(column, 3, Glyph::Block);
            } else {
                screen.write_str(column, 3, " ");
            }
        }
    }
}

/// 80 % of a margin
fn fraction(margin: u16) -> u16 {
    (margin as u32 * 4 / 5) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Grid, Led};

    const STEP_MS: u32 = 20;

    struct Rig {
        detector: HeartbeatDetector,
        screen: Screen<Grid>,
        led: Led,
    }

    impl Rig {
        fn new() -> Self {
            let mut detector = HeartbeatDetector::new(HeartbeatConfig::default());
            detector.reset(0);
            Self {
                detector,
                screen: Screen::new(Grid::new()),
                led: Led::default(),
            }
        }

        /// Feed a piecewise linear waveform sampled every `STEP_MS`.
        /// Returns the non-idle steps with their timestamps.
        fn feed(&mut self, points: &[(u32, u16)]) -> Vec<(u32, Step)> {
            let mut steps = Vec::new();
            for pair in points.windows(2) {
                let ((t0, v0), (t1, v1)) = (pair[0], pair[1]);
                let mut t = t0;
                while t < t1 {
                    let value = v0 as i32 + (v1 as i32 - v0 as i32) * (t - t0) as i32 / (t1 - t0) as i32;
                    let step = self.detector.consume(Sample::new(t, value as u16), &mut self.screen, &mut self.led);
                    if step != Step::Idle {
                        steps.push((t, step));
                    }
                    t += STEP_MS;
                }
            }
            steps
        }

        fn beats(steps: &[(u32, Step)]) -> Vec<u16> {
            steps
                .iter()
                .filter_map(|(_, step)| match step {
                    Step::Beat(bpm) => Some(*bpm),
                    _ => None,
                })
                .collect()
        }
    }

    /// Triangle wave between `low` and `high`, rising first
    fn triangle(t: u32, low: u16, high: u16, period: u32) -> u16 {
        let (phase, half) = (t % period, period / 2);
        let swing = (high - low) as u32;
        if phase < half {
            low + (phase * swing / half) as u16
        } else {
            high - ((phase - half) * swing / half) as u16
        }
    }

    #[test]
    fn first_peak_is_only_a_reference() {
        let mut rig = Rig::new();
        let steps = rig.feed(&[(0, 100), (1000, 600), (1300, 100)]);

        assert_eq!(steps, vec![(1080, Step::Peak)]);
        assert_eq!(rig.detector.history(), &[0; HISTORY_LEN]);
        assert!(!rig.detector.has_finger());
        assert_eq!(rig.detector.phase(), Phase::Falling);
    }

    #[test]
    fn first_beat_seeds_whole_history() {
        let mut rig = Rig::new();
        let steps = rig.feed(&[
            (0, 100),
            (1000, 600),
            (1100, 100),
            (1800, 100),
            (2000, 600),
            (2300, 100),
        ]);

        assert_eq!(Rig::beats(&steps), vec![60]);
        assert_eq!(rig.detector.history(), &[60; HISTORY_LEN]);
        assert_eq!(rig.detector.average_bpm(), 60);
        assert!(rig.detector.has_finger());
        assert!(rig.screen.writer().row(1).starts_with("Heart rate: 60BPM"));
        assert_eq!(rig.screen.writer().cell(19, 1), 'H');
    }

    #[test]
    fn peaks_one_second_apart_read_sixty_bpm() {
        let mut rig = Rig::new();
        let steps = rig.feed(&[
            (0, 100),
            (1000, 600),
            (1100, 100),
            (1800, 100),
            (2000, 600),
            (2100, 100),
            (2800, 100),
            (3000, 600),
            (3300, 100),
        ]);

        assert_eq!(Rig::beats(&steps), vec![60, 60]);
        assert_eq!(rig.detector.average_bpm(), 60);
    }

    #[test]
    fn pulse_on_dc_offset_reads_steady_rate() {
        let mut rig = Rig::new();
        let mut beats = Vec::new();
        for t in (0..8_000).step_by(STEP_MS as usize) {
            let sample = Sample::new(t, triangle(t, 700, 1000, 800));
            match rig.detector.consume(sample, &mut rig.screen, &mut rig.led) {
                Step::Beat(bpm) => beats.push(bpm),
                Step::Inactive => panic!("inactive at {}ms", t),
                _ => {}
            }
            assert!(!rig.screen.writer().row(1).starts_with("Please touch"), "finger lost at {}ms", t);
        }

        assert_eq!(beats, vec![75; 9]);
        assert_eq!(rig.detector.history(), &[75; HISTORY_LEN]);
        assert!(rig.detector.has_finger());
        assert!(rig.screen.writer().row(1).starts_with("Heart rate: 75BPM"));
    }

    #[test]
    fn peaks_closer_than_minimum_interval_count_once() {
        let mut rig = Rig::new();
        let steps = rig.feed(&[
            (0, 100),
            (1000, 600),
            (1100, 100),
            (1200, 600),
            (1300, 100),
            (2000, 600),
            (2300, 100),
        ]);

        // The peak at 1200 is rejected, the one at 2000 is measured from 1000
        assert_eq!(Rig::beats(&steps), vec![60]);
        assert!(steps.contains(&(1240, Step::Rejected)));
    }

    #[test]
    fn low_amplitude_peak_is_rejected() {
        let mut rig = Rig::new();
        let steps = rig.feed(&[
            (0, 100),
            (1000, 600),
            (1100, 100),
            (1800, 100),
            (2000, 600),
            (2100, 100),
            (3000, 500),
            (3100, 100),
        ]);

        assert_eq!(Rig::beats(&steps), vec![60]);
        assert!(steps.iter().any(|&(t, step)| t > 3000 && step == Step::Rejected));
        assert_eq!(rig.detector.history(), &[60; HISTORY_LEN]);
    }

    #[test]
    fn phase_changes_drive_indicator() {
        let mut rig = Rig::new();
        let steps = rig.feed(&[(0, 100), (1000, 600), (1100, 100), (1300, 400)]);

        assert!(steps.iter().any(|&(_, step)| step == Step::Trough));
        assert_eq!(rig.detector.phase(), Phase::Rising);
        assert!(rig.led.high);
        assert_eq!(rig.led.toggles, 1);
        assert_eq!(rig.screen.writer().cell(19, 1), 'h');
    }

    #[test]
    fn later_beats_update_one_slot() {
        let mut rig = Rig::new();
        let steps = rig.feed(&[
            (0, 100),
            (1000, 600),
            (1100, 100),
            (1800, 100),
            (2000, 600),
            (2100, 100),
            (2300, 100),
            (2500, 600),
            (2800, 100),
        ]);

        assert_eq!(Rig::beats(&steps), vec![60, 120]);
        let mut expected = [60; HISTORY_LEN];
        expected[1] = 120;
        assert_eq!(rig.detector.history(), &expected);
        assert_eq!(rig.detector.average_bpm(), 66);
    }

    #[test]
    fn lost_finger_keeps_history_and_prompts() {
        let mut rig = Rig::new();
        rig.feed(&[
            (0, 100),
            (1000, 600),
            (1100, 100),
            (1800, 100),
            (2000, 600),
            (2100, 100),
            (4200, 100),
        ]);

        assert!(!rig.detector.has_finger());
        assert_eq!(rig.detector.history(), &[60; HISTORY_LEN]);
        assert_eq!(rig.screen.writer().row(1), "Please touch sensor ");
    }

    #[test]
    fn no_interval_measured_across_lost_finger() {
        let mut rig = Rig::new();
        let mut steps = Vec::new();
        for t in (0..12_000).step_by(STEP_MS as usize) {
            let value = match t {
                0..=2_999 => triangle(t, 100, 600, 1000),
                3_000..=5_999 => 300,
                _ => triangle(t - 6_000, 100, 600, 800),
            };
            let step = rig.detector.consume(Sample::new(t, value), &mut rig.screen, &mut rig.led);
            if step != Step::Idle {
                steps.push((t, step));
            }
            if t == 5_000 {
                assert!(!rig.detector.has_finger());
                assert_eq!(rig.screen.writer().row(1), "Please touch sensor ");
            }
        }

        assert_eq!(Rig::beats(&steps), vec![60, 60, 75, 75, 75, 75, 75, 75]);
        assert!(steps.contains(&(6000, Step::Peak)));
        assert_eq!(rig.detector.history(), &[75; HISTORY_LEN]);
    }

    #[test]
    fn no_beat_for_inactivity_window_reports_inactive() {
        let mut rig = Rig::new();
        let steps = rig.feed(&[(0, 300), (10_100, 300)]);

        assert_eq!(steps.first().map(|&(_, step)| step), Some(Step::Inactive));
        assert!(steps.iter().all(|&(t, _)| t > 10_000));
    }

    #[test]
    fn graph_tracks_waveform_level() {
        let mut rig = Rig::new();
        rig.feed(&[(0, 20), (80, 20)]);
        assert_eq!(rig.screen.writer().row(3), format!("#{}", " ".repeat(19)));

        rig.feed(&[(100, 1000), (180, 1000)]);
        assert_eq!(rig.screen.writer().row(3), "#".repeat(20));
    }
}
