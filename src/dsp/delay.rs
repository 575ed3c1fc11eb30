//! Feedback delay line — the rhythmic echo path, independent of the reverb.

use crate::error::ConfigError;

/// Longest delay buffer, in seconds.
pub const MAX_DELAY_SECONDS: f64 = 60.0;

/// A stereo delay with feedback. Output is wet only.
///
/// The buffer holds up to `max_delay_seconds` of audio; the delay time can
/// be changed at any point within that bound.
#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,
    max_delay: f64,
    delay_time: f64,
    feedback: f64,
}

impl FeedbackDelay {
    /// Create a delay line with the default settings (0.75 s, 0.3 feedback).
    ///
    /// The buffer length must be finite, non-negative and at most
    /// [`MAX_DELAY_SECONDS`]; allocation failure is reported, not aborted on.
    pub fn new(sample_rate: f64, max_delay_seconds: f64) -> Result<Self, ConfigError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "sample rate",
                value: sample_rate,
            });
        }
        if !(max_delay_seconds.is_finite() && max_delay_seconds >= 0.0) {
            return Err(ConfigError::Duration {
                name: "delay buffer",
                value: max_delay_seconds,
            });
        }
        if max_delay_seconds > MAX_DELAY_SECONDS {
            return Err(ConfigError::AboveMaximum {
                name: "delay buffer",
                value: max_delay_seconds,
                max: MAX_DELAY_SECONDS,
            });
        }

        let frames = (sample_rate * max_delay_seconds).ceil();
        if frames >= (isize::MAX as f64) / 4.0 {
            return Err(ConfigError::DelayAllocation(usize::MAX));
        }
        let buffer_size = frames as usize + 1;
        let bytes = buffer_size.saturating_mul(2 * std::mem::size_of::<f32>());
        let mut buffers = [Vec::new(), Vec::new()];
        for buffer in buffers.iter_mut() {
            buffer
                .try_reserve_exact(buffer_size)
                .map_err(|_| ConfigError::DelayAllocation(bytes))?;
            buffer.resize(buffer_size, 0.0_f32);
        }
        let [buffer_l, buffer_r] = buffers;

        Ok(Self {
            buffer_l,
            buffer_r,
            write_pos: 0,
            sample_rate,
            max_delay: max_delay_seconds,
            delay_time: 0.75_f64.min(max_delay_seconds),
            feedback: 0.3,
        })
    }

    /// Create a delay with specific parameters.
    pub fn with_params(
        sample_rate: f64,
        max_delay_seconds: f64,
        delay_time: f64,
        feedback: f64,
    ) -> Result<Self, ConfigError> {
        let mut d = Self::new(sample_rate, max_delay_seconds)?;
        d.configure(delay_time, feedback)?;
        Ok(d)
    }

    /// Set delay time and feedback gain.
    ///
    /// Feedback must lie in `[0, 1)` so the loop always decays; anything else
    /// is rejected and the previous settings are kept.
    pub fn configure(&mut self, delay_time: f64, feedback: f64) -> Result<(), ConfigError> {
        validate_feedback(feedback)?;
        if !(delay_time.is_finite() && delay_time >= 0.0) {
            return Err(ConfigError::Duration {
                name: "delay time",
                value: delay_time,
            });
        }
        if delay_time > self.max_delay {
            return Err(ConfigError::DelayTooLong {
                time: delay_time,
                max: self.max_delay,
            });
        }
        self.delay_time = delay_time;
        self.feedback = feedback;
        Ok(())
    }

    pub fn delay_time(&self) -> f64 {
        self.delay_time
    }

    pub fn feedback(&self) -> f64 {
        self.feedback
    }

    /// Process a stereo sample pair, returning the delayed signal.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let buffer_len = self.buffer_l.len();
        let delay_samples = ((self.delay_time * self.sample_rate) as usize).min(buffer_len - 1);

        let read_pos = if self.write_pos >= delay_samples {
            self.write_pos - delay_samples
        } else {
            buffer_len - (delay_samples - self.write_pos)
        };

        let delayed_l = self.buffer_l[read_pos];
        let delayed_r = self.buffer_r[read_pos];

        self.buffer_l[self.write_pos] = left + delayed_l * self.feedback as f32;
        self.buffer_r[self.write_pos] = right + delayed_r * self.feedback as f32;

        self.write_pos = (self.write_pos + 1) % buffer_len;

        (delayed_l, delayed_r)
    }

    /// Clear the delay buffers.
    pub fn clear(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

/// Feedback gains must be finite and in `[0, 1)`.
pub fn validate_feedback(feedback: f64) -> Result<(), ConfigError> {
    if feedback.is_finite() && (0.0..1.0).contains(&feedback) {
        Ok(())
    } else {
        Err(ConfigError::FeedbackGain(feedback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let delay = FeedbackDelay::new(44100.0, 5.0).unwrap();
        assert_eq!(delay.delay_time(), 0.75);
        assert_eq!(delay.feedback(), 0.3);
    }

    #[test]
    fn outputs_delayed_signal() {
        let sample_rate = 44100.0;
        let delay_time = 0.01;
        let mut delay = FeedbackDelay::with_params(sample_rate, 1.0, delay_time, 0.0).unwrap();

        delay.process(1.0, 1.0);
        let delay_samples = (delay_time * sample_rate) as usize;
        for _ in 1..delay_samples {
            let (out_l, _) = delay.process(0.0, 0.0);
            assert!(out_l.abs() < 1e-6);
        }

        let (out_l, out_r) = delay.process(0.0, 0.0);
        assert!((out_l - 1.0).abs() < 1e-6);
        assert!((out_r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn echoes_decay_by_feedback() {
        let sample_rate = 1000.0;
        let delay_time = 0.01;
        let mut delay = FeedbackDelay::with_params(sample_rate, 1.0, delay_time, 0.5).unwrap();

        delay.process(1.0, 1.0);
        let delay_samples = (delay_time * sample_rate) as usize;
        let mut echoes = Vec::new();
        for _ in 0..4 {
            for _ in 1..delay_samples {
                delay.process(0.0, 0.0);
            }
            echoes.push(delay.process(0.0, 0.0).0);
        }
        assert_eq!(echoes, vec![1.0, 0.5, 0.25, 0.125]);
    }

    #[test]
    fn feedback_at_or_above_one_rejected() {
        let mut delay = FeedbackDelay::new(44100.0, 5.0).unwrap();
        assert_eq!(delay.configure(0.75, 1.0), Err(ConfigError::FeedbackGain(1.0)));
        assert!(delay.configure(0.75, 1.5).is_err());
        assert!(delay.configure(0.75, -0.1).is_err());
        assert!(delay.configure(0.75, f64::NAN).is_err());
        assert_eq!(delay.feedback(), 0.3);
    }

    #[test]
    fn gain_always_below_one_after_configure() {
        let mut delay = FeedbackDelay::new(8000.0, 1.0).unwrap();
        for i in 0..=300 {
            let g = i as f64 / 100.0 - 0.5;
            let _ = delay.configure(0.5, g);
            assert!(delay.feedback() < 1.0, "gain {g} left feedback at {}", delay.feedback());
        }
    }

    #[test]
    fn delay_time_validated() {
        let mut delay = FeedbackDelay::new(8000.0, 1.0).unwrap();
        assert!(matches!(delay.configure(2.0, 0.3), Err(ConfigError::DelayTooLong { .. })));
        assert!(matches!(delay.configure(-1.0, 0.3), Err(ConfigError::Duration { .. })));
    }

    #[test]
    fn oversized_buffer_rejected() {
        assert_eq!(
            FeedbackDelay::new(44100.0, 1e20).err(),
            Some(ConfigError::AboveMaximum {
                name: "delay buffer",
                value: 1e20,
                max: MAX_DELAY_SECONDS,
            })
        );
        assert!(matches!(
            FeedbackDelay::new(44100.0, f64::INFINITY),
            Err(ConfigError::Duration { .. })
        ));
        assert!(matches!(
            FeedbackDelay::new(0.0, 1.0),
            Err(ConfigError::NotPositive { .. })
        ));
        let delay = FeedbackDelay::new(8000.0, 0.0).unwrap();
        assert_eq!(delay.delay_time(), 0.0);
    }

    #[test]
    fn bounded_under_sustained_input() {
        let mut delay = FeedbackDelay::with_params(1000.0, 1.0, 0.01, 0.99).unwrap();
        let mut peak = 0.0_f32;
        for _ in 0..100_000 {
            let (l, _) = delay.process(1.0, 1.0);
            peak = peak.max(l.abs());
        }
        // Geometric bound 1 / (1 - g).
        assert!(peak <= 100.0 + 1e-2, "peak {peak}");
    }
}
