//! Engine configuration.
//!
//! Every field has a default matching the stock piece, so a partial
//! JSON document (or none at all) is enough to build an engine.

use serde::{Deserialize, Serialize};

use crate::dsp::delay::{MAX_DELAY_SECONDS, validate_feedback};
use crate::dsp::voice::SendLevels;
use crate::error::ConfigError;
use crate::sequencer::{BarTiming, BassConfig, MelodyConfig, PadConfig, Progression};
use crate::timeline::{SectionProfiles, TimelineConfig};

/// Highest accepted output sample rate, in Hz.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Bar timing and look-ahead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Length of one bar in seconds.
    pub bar_duration: f64,
    /// How far ahead of a bar's start its voices are created.
    pub lookahead: f64,
    /// How far ahead of the clock audio is rendered into the sink.
    pub render_ahead: f64,
    /// Onset offset between successive chord voices.
    pub chord_stagger: f64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        SchedulingConfig {
            bar_duration: 6.0,
            lookahead: 0.1,
            render_ahead: 0.05,
            chord_stagger: 0.2,
        }
    }
}

impl SchedulingConfig {
    pub fn timing(&self) -> BarTiming {
        BarTiming {
            bar_duration: self.bar_duration,
            chord_stagger: self.chord_stagger,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    pub enabled: bool,
    /// Impulse length in seconds.
    pub length: f64,
    /// Decay constant is `length / decay_divisor`.
    pub decay_divisor: f64,
    /// Byte limit for the impulse plus the convolver built from it. Reverb
    /// that needs more is disabled.
    pub max_bytes: usize,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        ReverbConfig {
            enabled: true,
            length: 5.0,
            decay_divisor: 8.0,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub time: f64,
    pub feedback: f64,
    /// Size of the delay buffer in seconds.
    pub max_time: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig {
            time: 0.75,
            feedback: 0.3,
            max_time: 5.0,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub master_gain: f64,
    /// Seed for the impulse noise and melody choices. Random when absent.
    pub seed: Option<u64>,
    pub scheduling: SchedulingConfig,
    pub progression: Progression,
    pub pad: PadConfig,
    pub bass: BassConfig,
    pub melody: MelodyConfig,
    pub reverb: ReverbConfig,
    pub delay: DelayConfig,
    pub sends: SendLevels,
    pub timeline: TimelineConfig,
    pub sections: SectionProfiles,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            master_gain: 1.0,
            seed: None,
            scheduling: SchedulingConfig::default(),
            progression: Progression::default(),
            pad: PadConfig::default(),
            bass: BassConfig::default(),
            melody: MelodyConfig::default(),
            reverb: ReverbConfig::default(),
            delay: DelayConfig::default(),
            sends: SendLevels::default(),
            timeline: TimelineConfig::default(),
            sections: SectionProfiles::default(),
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn at_most(name: &'static str, value: f64, max: f64) -> Result<(), ConfigError> {
    if value <= max {
        Ok(())
    } else {
        Err(ConfigError::AboveMaximum { name, value, max })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Duration { name, value })
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Check every value before anything is scheduled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("sample rate", self.sample_rate as f64)?;
        at_most("sample rate", self.sample_rate as f64, MAX_SAMPLE_RATE as f64)?;
        non_negative("master gain", self.master_gain)?;

        let s = &self.scheduling;
        positive("bar duration", s.bar_duration)?;
        non_negative("lookahead", s.lookahead)?;
        non_negative("render ahead", s.render_ahead)?;
        non_negative("chord stagger", s.chord_stagger)?;

        self.progression.validate()?;
        self.pad.validate()?;
        self.bass.validate()?;
        self.melody.validate()?;

        if self.reverb.enabled {
            positive("reverb length", self.reverb.length)?;
            positive("reverb decay divisor", self.reverb.decay_divisor)?;
        }

        validate_feedback(self.delay.feedback)?;
        non_negative("delay time", self.delay.time)?;
        non_negative("delay buffer", self.delay.max_time)?;
        at_most("delay buffer", self.delay.max_time, MAX_DELAY_SECONDS)?;
        if self.delay.time > self.delay.max_time {
            return Err(ConfigError::DelayTooLong {
                time: self.delay.time,
                max: self.delay.max_time,
            });
        }

        for (name, value) in [
            ("dry send", self.sends.dry),
            ("reverb send", self.sends.reverb),
            ("delay send", self.sends.delay),
        ] {
            non_negative(name, value)?;
        }

        self.timeline.validate()?;
        self.sections.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::Pitch;
    use crate::timeline::WrapPolicy;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduling.bar_duration, 6.0);
        assert_eq!(config.delay.feedback, 0.3);
        assert_eq!(config.reverb.length, 5.0);
    }

    #[test]
    fn empty_json_gives_defaults() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_json_overrides() {
        let json = r#"{
            "sample_rate": 22050,
            "seed": 7,
            "delay": { "feedback": 0.5 },
            "timeline": { "wrap": "hold_outro" },
            "progression": {
                "chords": [["C4", "E4", "G4"], [65, 69, 72]],
                "bass": ["C2", 41]
            }
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.delay.feedback, 0.5);
        assert_eq!(config.delay.time, 0.75);
        assert_eq!(config.timeline.wrap, WrapPolicy::HoldOutro);
        assert_eq!(config.progression.chords[0], vec![Pitch(60), Pitch(64), Pitch(67)]);
        assert_eq!(config.progression.bass, vec![Pitch(36), Pitch(41)]);
    }

    #[test]
    fn feedback_of_one_rejected() {
        let err = EngineConfig::from_json(r#"{ "delay": { "feedback": 1.0 } }"#).unwrap_err();
        assert_eq!(err, ConfigError::FeedbackGain(1.0));
    }

    #[test]
    fn mismatched_progression_rejected() {
        let mut config = EngineConfig::default();
        config.progression.bass.pop();
        assert_eq!(
            config.validate(),
            Err(ConfigError::ProgressionMismatch { chords: 4, bass: 3 })
        );
    }

    #[test]
    fn bad_values_rejected() {
        let mut config = EngineConfig::default();
        config.scheduling.bar_duration = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::NotPositive { .. })));

        let mut config = EngineConfig::default();
        config.delay.time = 6.0;
        assert!(matches!(config.validate(), Err(ConfigError::DelayTooLong { .. })));

        let mut config = EngineConfig::default();
        config.sections.chorus.melody_probability = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfUnitRange { .. })));
    }

    #[test]
    fn oversized_delay_buffer_rejected() {
        let mut config = EngineConfig::default();
        config.delay.max_time = 1e20;
        assert_eq!(
            config.validate(),
            Err(ConfigError::AboveMaximum {
                name: "delay buffer",
                value: 1e20,
                max: MAX_DELAY_SECONDS,
            })
        );

        config.delay.max_time = MAX_DELAY_SECONDS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sample_rate_capped() {
        let mut config = EngineConfig::default();
        config.sample_rate = u32::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AboveMaximum { name: "sample rate", .. })
        ));

        config.sample_rate = MAX_SAMPLE_RATE;
        assert!(config.validate().is_ok());
        config.sample_rate = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NotPositive { .. })));
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(EngineConfig::from_json("{"), Err(ConfigError::Json(_))));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "progression": { "chords": [["H9"]], "bass": [40] } }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn json_roundtrips_through_defaults() {
        let config = EngineConfig::default();
        assert_eq!(EngineConfig::from_json(&config.to_json()).unwrap(), config);
    }
}
