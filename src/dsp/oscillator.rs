//! Tone generation — PolyBLEP oscillators and their scheduled start/stop contract.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::ToneError;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// A band-limited oscillator with anti-aliasing (PolyBLEP).
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            phase: 0.0,
            sample_rate,
        }
    }

    fn phase_inc(&self) -> f64 {
        self.frequency / self.sample_rate
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => self.sawtooth(inc),
            Waveform::Square => self.square(inc),
            Waveform::Triangle => self.triangle(),
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    fn sawtooth(&self, inc: f64) -> f64 {
        let naive = 2.0 * self.phase - 1.0;
        naive - poly_blep(self.phase, inc)
    }

    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    /// Piecewise linear: -1→+1 over [0, 0.5), +1→-1 over [0.5, 1).
    fn triangle(&self) -> f64 {
        if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        }
    }

    /// Reset oscillator phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

// ── Scheduled tone ──────────────────────────────────────────

/// The schedulable half of a voice's source: shape, pitch and the
/// start/stop window on the engine timeline.
///
/// Policy: starting twice and stopping before starting are rejected with a
/// [`ToneError`]; a repeated `stop` is ignored and keeps the first stop time.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneGenerator {
    waveform: Waveform,
    frequency: f64,
    start: Option<f64>,
    stop: Option<f64>,
}

impl ToneGenerator {
    pub fn new(waveform: Waveform) -> Self {
        ToneGenerator {
            waveform,
            frequency: 440.0,
            start: None,
            stop: None,
        }
    }

    pub fn set_frequency(&mut self, hz: f64) {
        self.frequency = hz;
    }

    pub fn start(&mut self, at: f64) -> Result<(), ToneError> {
        if let Some(existing) = self.start {
            return Err(ToneError::AlreadyStarted(existing));
        }
        self.start = Some(at);
        Ok(())
    }

    pub fn stop(&mut self, at: f64) -> Result<(), ToneError> {
        let Some(start) = self.start else {
            return Err(ToneError::NotStarted);
        };
        if self.stop.is_some() {
            return Ok(());
        }
        if at < start {
            return Err(ToneError::StopBeforeStart { start, stop: at });
        }
        self.stop = Some(at);
        Ok(())
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.stop
    }

    /// Whether the tone is sounding at engine time `t`.
    pub fn is_sounding(&self, t: f64) -> bool {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => t >= start && t < stop,
            (Some(start), None) => t >= start,
            _ => false,
        }
    }

    /// A sample generator for this tone.
    pub fn oscillator(&self, sample_rate: f64) -> Oscillator {
        let mut osc = Oscillator::new(self.waveform, sample_rate);
        osc.frequency = self.frequency;
        osc
    }
}
