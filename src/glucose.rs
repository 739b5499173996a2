//! Glucose concentration from the cuvette photoresistor

use crate::{
    config::GlucoseConfig,
    display::{CellWriter, Glyph, Screen},
    sample::{elapsed, Millis, Sample},
};

/// Log-linear calibration curve fitted against the reading of a blank
/// reference cuvette
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    /// Raw reading of the reference cuvette
    pub reference: f32,
    /// Absorbance at zero concentration
    pub intercept: f32,
    /// Absorbance per mM
    pub slope: f32,
}

impl Calibration {
    pub const DEFAULT: Self = Self {
        reference: 427.0,
        intercept: 0.0224,
        slope: 0.0335,
    };

    /// Concentration in mM for a raw reading:
    /// `(log10(reference / raw) - intercept) / slope`
    pub fn concentration(&self, raw: u16) -> Result<f32, CalibrationError> {
        if raw == 0 {
            return Err(CalibrationError::ZeroReading);
        }
        let absorbance = libm::log10f(self.reference / raw as f32);
        Ok((absorbance - self.intercept) / self.slope)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// The logarithm is undefined for a zero reading
    ZeroReading,
}

/// Outcome of one glucose reading
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reading {
    /// Screen busy with an alert; sample ignored
    Suppressed,
    /// Reading too bright for a cuvette to be present
    NoCuvette,
    /// Concentration in mM
    Concentration(f32),
    /// Reading outside the calibration domain
    OutOfRange,
    /// No cuvette for longer than the inactivity window
    TimedOut,
}

pub struct GlucoseDetector {
    config: GlucoseConfig,
    last_valid: Millis,
}

impl GlucoseDetector {
    pub fn new(config: GlucoseConfig) -> Self {
        Self {
            config,
            last_valid: 0,
        }
    }

    /// Start a fresh measurement session
    pub fn reset(&mut self, now: Millis) {
        self.last_valid = now;
    }

    /// Time of the last concentration reading, or of the last reset
    pub fn last_valid(&self) -> Millis {
        self.last_valid
    }

    pub fn calibration(&self) -> &Calibration {
        &self.config.calibration
    }

    /// Evaluate one sample and render the result
    pub fn consume<W: CellWriter>(&mut self, sample: Sample, now: Millis, screen: &mut Screen<W>) -> Reading {
        if !screen.can_draw() {
            return Reading::Suppressed;
        }

        if sample.value > self.config.no_cuvette_threshold {
            if elapsed(self.last_valid, now) > self.config.inactivity_ms {
                return Reading::TimedOut;
            }
            screen.write_str(18, 1, " ");
            screen.write_str(18, 2, "?");
            screen.write_str(0, 2, "Please insert");
            screen.write_str(0, 3, "cuvette.");
            return Reading::NoCuvette;
        }

        match self.config.calibration.concentration(sample.value) {
            Ok(conc) => {
                screen.write_glyph(18, 1, Glyph::Block);
                screen.write_glyph(18, 2, Glyph::Block);
                screen.write_fmt(0, 2, format_args!("Conc: {:.2}mM    ", conc));
                screen.write_str(0, 3, "               ");
                self.last_valid = now;
                Reading::Concentration(conc)
            }
            Err(err) => {
                warn!("glucose reading rejected: {}", err);
                screen.write_str(18, 2, "!");
                screen.write_str(0, 2, "Out of range     ");
                Reading::OutOfRange
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Grid;

    fn detector() -> GlucoseDetector {
        let mut detector = GlucoseDetector::new(GlucoseConfig::default());
        detector.reset(0);
        detector
    }

    #[test]
    fn reference_reading_gives_intercept_offset() {
        let conc = Calibration::DEFAULT.concentration(427).unwrap();
        assert!((conc - (-0.0224 / 0.0335)).abs() < 1e-4);
        assert!((conc + 0.668).abs() < 1e-3);
    }

    #[test]
    fn concentration_rises_as_reading_falls() {
        let cal = Calibration::DEFAULT;
        let readings = [170u16, 120, 60, 20, 5, 1];
        let concs: Vec<f32> = readings.iter().map(|&r| cal.concentration(r).unwrap()).collect();
        assert!(concs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_reading_is_rejected() {
        assert_eq!(
            Calibration::DEFAULT.concentration(0),
            Err(CalibrationError::ZeroReading)
        );
    }

    #[test]
    fn bright_reading_prompts_for_cuvette() {
        let mut screen = Screen::new(Grid::new());
        let reading = detector().consume(Sample::new(100, 300), 100, &mut screen);

        assert_eq!(reading, Reading::NoCuvette);
        assert!(screen.writer().row(2).starts_with("Please insert"));
        assert!(screen.writer().row(3).starts_with("cuvette."));
        assert_eq!(screen.writer().cell(18, 2), '?');
    }

    #[test]
    fn cuvette_reading_renders_concentration() {
        let mut screen = Screen::new(Grid::new());
        let reading = detector().consume(Sample::new(100, 120), 100, &mut screen);

        assert!(matches!(reading, Reading::Concentration(c) if (c - 15.786).abs() < 1e-2));
        assert!(screen.writer().row(2).starts_with("Conc: 15.79mM"));
        assert_eq!(screen.writer().cell(18, 1), '#');
    }

    #[test]
    fn missing_cuvette_times_out_after_inactivity_window() {
        let mut screen = Screen::new(Grid::new());
        let mut detector = detector();

        let expected = Calibration::DEFAULT.concentration(90).unwrap();
        assert_eq!(
            detector.consume(Sample::new(5_000, 90), 5_000, &mut screen),
            Reading::Concentration(expected)
        );
        assert_eq!(detector.consume(Sample::new(15_000, 400), 15_000, &mut screen), Reading::NoCuvette);
        assert_eq!(detector.consume(Sample::new(15_001, 400), 15_001, &mut screen), Reading::TimedOut);
    }

    #[test]
    fn zero_reading_does_not_count_as_valid() {
        let mut screen = Screen::new(Grid::new());
        let mut detector = detector();

        assert_eq!(detector.consume(Sample::new(9_000, 0), 9_000, &mut screen), Reading::OutOfRange);
        assert_eq!(detector.consume(Sample::new(10_001, 400), 10_001, &mut screen), Reading::TimedOut);
    }

    #[test]
    fn alert_suppresses_processing() {
        let mut screen = Screen::new(Grid::new());
        screen.draw_alert("Glucose", None);
        assert_eq!(detector().consume(Sample::new(20_000, 400), 20_000, &mut screen), Reading::Suppressed);
    }
}
