//! Harmonic sequencer — decides which notes each bar plays.
//!
//! Chord and bass selection is a pure function of the bar index and the
//! section profile ([`HarmonicSequencer::harmony`]). Melody placement is the
//! only stochastic part ([`HarmonicSequencer::melody`]).

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::dsp::envelope::{Curve, EnvelopeShape};
use crate::dsp::filter::FilterSettings;
use crate::dsp::oscillator::Waveform;
use crate::dsp::voice::VoiceRole;
use crate::error::ConfigError;
use crate::pitch::Pitch;
use crate::timeline::{BassPattern, Section, SectionProfile};

pub type Chord = Vec<Pitch>;

// ── Progression ─────────────────────────────────────────────

/// One chord and one bass note per bar, cycling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progression {
    pub chords: Vec<Chord>,
    pub bass: Vec<Pitch>,
}

impl Progression {
    pub fn new(chords: Vec<Chord>, bass: Vec<Pitch>) -> Result<Self, ConfigError> {
        let progression = Progression { chords, bass };
        progression.validate()?;
        Ok(progression)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chords.is_empty() {
            return Err(ConfigError::EmptyProgression);
        }
        if self.chords.len() != self.bass.len() {
            return Err(ConfigError::ProgressionMismatch {
                chords: self.chords.len(),
                bass: self.bass.len(),
            });
        }
        if let Some(i) = self.chords.iter().position(|c| c.is_empty()) {
            return Err(ConfigError::EmptyChord(i));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    pub fn chord(&self, bar: u64) -> &[Pitch] {
        &self.chords[(bar % self.chords.len() as u64) as usize]
    }

    pub fn bass(&self, bar: u64) -> Pitch {
        self.bass[(bar % self.bass.len() as u64) as usize]
    }
}

impl Default for Progression {
    /// Gm – F – Gm – Dm over G2, Eb3, F3, D3.
    fn default() -> Self {
        let p = |ns: &[i32]| ns.iter().copied().map(Pitch).collect::<Vec<_>>();
        Progression {
            chords: vec![
                p(&[55, 58, 62]),
                p(&[65, 69, 72]),
                p(&[67, 70, 74]),
                p(&[62, 65, 69]),
            ],
            bass: p(&[43, 51, 53, 50]),
        }
    }
}

// ── Voice settings ──────────────────────────────────────────

/// Sustained chord pads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    pub waveform: Waveform,
    pub shape: EnvelopeShape,
    pub filter: FilterSettings,
}

impl Default for PadConfig {
    fn default() -> Self {
        PadConfig {
            waveform: Waveform::Sine,
            shape: EnvelopeShape {
                attack: 0.5,
                hold: 0.0,
                release_curve: Curve::Linear,
            },
            filter: FilterSettings::PAD,
        }
    }
}

/// Bass line, pulsed or sustained depending on the section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BassConfig {
    pub waveform: Waveform,
    /// Notes per bar when pulsed.
    pub hits: u32,
    /// Length of each pulsed note in seconds.
    pub note_length: f64,
    pub pulse_shape: EnvelopeShape,
    pub pulse_filter: FilterSettings,
    pub sustain_shape: EnvelopeShape,
    pub sustain_filter: FilterSettings,
}

impl Default for BassConfig {
    fn default() -> Self {
        BassConfig {
            waveform: Waveform::Sine,
            hits: 12,
            note_length: 0.4,
            pulse_shape: EnvelopeShape {
                attack: 0.05,
                hold: 0.0,
                release_curve: Curve::Linear,
            },
            pulse_filter: FilterSettings::RHYTHM,
            sustain_shape: EnvelopeShape {
                attack: 0.5,
                hold: 0.0,
                release_curve: Curve::Linear,
            },
            sustain_filter: FilterSettings::PAD,
        }
    }
}

/// Occasional melody notes from a fixed scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelodyConfig {
    pub waveform: Waveform,
    pub level: f64,
    pub duration: f64,
    pub shape: EnvelopeShape,
    pub filter: FilterSettings,
    pub scale: Vec<Pitch>,
}

impl Default for MelodyConfig {
    fn default() -> Self {
        MelodyConfig {
            waveform: Waveform::Triangle,
            level: 0.02,
            duration: 2.0,
            shape: EnvelopeShape {
                attack: 0.3,
                hold: 0.0,
                release_curve: Curve::Exponential,
            },
            filter: FilterSettings::RHYTHM,
            scale: [60, 62, 65, 67, 72, 74, 77, 79, 84, 86, 89]
                .into_iter()
                .map(Pitch)
                .collect(),
        }
    }
}

fn validate_shape(name: &'static str, shape: &EnvelopeShape) -> Result<(), ConfigError> {
    for value in [shape.attack, shape.hold] {
        if !(value.is_finite() && value >= 0.0) {
            return Err(ConfigError::Duration { name, value });
        }
    }
    Ok(())
}

impl PadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_shape("pad envelope", &self.shape)?;
        self.filter.validate()
    }
}

impl BassConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hits == 0 {
            return Err(ConfigError::NotPositive {
                name: "bass hits",
                value: 0.0,
            });
        }
        if !(self.note_length.is_finite() && self.note_length > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "bass note length",
                value: self.note_length,
            });
        }
        validate_shape("bass pulse envelope", &self.pulse_shape)?;
        validate_shape("bass sustain envelope", &self.sustain_shape)?;
        self.pulse_filter.validate()?;
        self.sustain_filter.validate()
    }
}

impl MelodyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale.is_empty() {
            return Err(ConfigError::EmptyScale);
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "melody duration",
                value: self.duration,
            });
        }
        if !(self.level.is_finite() && self.level >= 0.0) {
            return Err(ConfigError::NotPositive {
                name: "melody level",
                value: self.level,
            });
        }
        validate_shape("melody envelope", &self.shape)?;
        self.filter.validate()
    }
}

// ── Bar planning ────────────────────────────────────────────

/// A request for one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteRequest {
    pub role: VoiceRole,
    pub pitch: Pitch,
    pub waveform: Waveform,
    /// Engine time in seconds.
    pub start: f64,
    pub duration: f64,
    /// Target amplitude of the envelope.
    pub level: f64,
    pub shape: EnvelopeShape,
    pub filter: FilterSettings,
}

impl NoteRequest {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Everything one bar plays, in issue order: chord voices, bass, melody.
#[derive(Debug, Clone, PartialEq)]
pub struct BarPlan {
    pub index: u64,
    pub start: f64,
    pub section: Section,
    pub notes: Vec<NoteRequest>,
}

/// Bar timing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarTiming {
    pub bar_duration: f64,
    pub chord_stagger: f64,
}

pub struct HarmonicSequencer {
    progression: Progression,
    timing: BarTiming,
    pad: PadConfig,
    bass: BassConfig,
    melody: MelodyConfig,
    rng: StdRng,
}

impl HarmonicSequencer {
    pub fn new(
        progression: Progression,
        timing: BarTiming,
        pad: PadConfig,
        bass: BassConfig,
        melody: MelodyConfig,
        rng: StdRng,
    ) -> Self {
        HarmonicSequencer {
            progression,
            timing,
            pad,
            bass,
            melody,
            rng,
        }
    }

    pub fn progression(&self) -> &Progression {
        &self.progression
    }

    pub fn bar_duration(&self) -> f64 {
        self.timing.bar_duration
    }

    /// Bar index at `elapsed` seconds into the session.
    pub fn bar_index_at(&self, elapsed: f64) -> u64 {
        (elapsed.max(0.0) / self.timing.bar_duration).floor() as u64
    }

    pub fn chord_for_bar(&self, bar: u64) -> &[Pitch] {
        self.progression.chord(bar)
    }

    pub fn bass_for_bar(&self, bar: u64) -> Pitch {
        self.progression.bass(bar)
    }

    /// Plan bar `index`, starting at engine time `start`.
    pub fn plan_bar(
        &mut self,
        index: u64,
        start: f64,
        section: Section,
        profile: &SectionProfile,
    ) -> BarPlan {
        let mut notes = self.harmony(index, start, profile);
        if section != Section::Intro {
            notes.extend(self.melody(start, profile));
        }
        BarPlan {
            index,
            start,
            section,
            notes,
        }
    }

    /// Chord pads and bass for a bar. Deterministic.
    pub fn harmony(&self, index: u64, start: f64, profile: &SectionProfile) -> Vec<NoteRequest> {
        let bar = self.timing.bar_duration;
        let end = start + bar;
        let mut notes = Vec::new();

        for (i, &pitch) in self.chord_for_bar(index).iter().enumerate() {
            let onset = start + i as f64 * self.timing.chord_stagger;
            if onset >= end {
                break;
            }
            notes.push(NoteRequest {
                role: VoiceRole::Pad,
                pitch,
                waveform: self.pad.waveform,
                start: onset,
                duration: end - onset,
                level: profile.pad_level,
                shape: self.pad.shape,
                filter: self.pad.filter,
            });
        }

        let bass = self.bass_for_bar(index);
        match profile.bass_pattern {
            BassPattern::Pulsed => {
                let spacing = bar / self.bass.hits as f64;
                for i in 0..self.bass.hits {
                    notes.push(NoteRequest {
                        role: VoiceRole::Bass,
                        pitch: bass,
                        waveform: self.bass.waveform,
                        start: start + i as f64 * spacing,
                        duration: self.bass.note_length,
                        level: profile.bass_level,
                        shape: self.bass.pulse_shape,
                        filter: self.bass.pulse_filter,
                    });
                }
            }
            BassPattern::Sustained => notes.push(NoteRequest {
                role: VoiceRole::Bass,
                pitch: bass,
                waveform: self.bass.waveform,
                start,
                duration: bar,
                level: profile.bass_level,
                shape: self.bass.sustain_shape,
                filter: self.bass.sustain_filter,
            }),
        }

        notes
    }

    /// Maybe one melody note somewhere inside the bar.
    pub fn melody(&mut self, start: f64, profile: &SectionProfile) -> Option<NoteRequest> {
        let probability = profile.melody_probability.clamp(0.0, 1.0);
        if probability == 0.0 || !self.rng.gen_bool(probability) {
            return None;
        }
        let scale = &self.melody.scale;
        let pitch = *scale.get(self.rng.gen_range(0..scale.len()))?;
        let duration = self.melody.duration.min(self.timing.bar_duration);
        let latest = (self.timing.bar_duration - duration).max(0.0);
        let offset = if latest > 0.0 {
            self.rng.gen_range(0.0..=latest)
        } else {
            0.0
        };
        Some(NoteRequest {
            role: VoiceRole::Melody,
            pitch,
            waveform: self.melody.waveform,
            start: start + offset,
            duration,
            level: self.melody.level,
            shape: self.melody.shape,
            filter: self.melody.filter,
        })
    }
}
