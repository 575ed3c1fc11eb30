//! Resonant low-pass stage — RBJ cookbook biquad.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Cutoff and resonance of a voice's filter stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Cutoff frequency in Hz.
    pub cutoff: f64,
    /// Resonance (Q).
    pub q: f64,
}

impl FilterSettings {
    /// Brighter preset for sustained pad voices.
    pub const PAD: FilterSettings = FilterSettings {
        cutoff: 1500.0,
        q: 2.0,
    };

    /// Darker preset for rhythmic voices.
    pub const RHYTHM: FilterSettings = FilterSettings {
        cutoff: 800.0,
        q: 2.0,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "filter cutoff",
                value: self.cutoff,
            });
        }
        if !(self.q.is_finite() && self.q > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "filter q",
                value: self.q,
            });
        }
        Ok(())
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings::PAD
    }
}

/// A 2nd-order low-pass IIR filter.
///
/// Direct Form II Transposed; coefficients from the Audio EQ Cookbook
/// (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    settings: FilterSettings,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
}

impl BiquadFilter {
    pub fn new(settings: FilterSettings, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            settings,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    /// Change cutoff and resonance. Filter state is kept so a running
    /// voice does not click.
    pub fn configure(&mut self, cutoff_hz: f64, q: f64) -> Result<(), ConfigError> {
        let settings = FilterSettings { cutoff: cutoff_hz, q };
        settings.validate()?;
        self.settings = settings;
        self.update_coefficients();
        Ok(())
    }

    pub fn settings(&self) -> FilterSettings {
        self.settings
    }

    fn update_coefficients(&mut self) {
        // Keep the cutoff below Nyquist so the coefficients stay stable.
        let nyquist = self.sample_rate / 2.0;
        let freq = self.settings.cutoff.min(nyquist * 0.999);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.settings.q);

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
