//! Pitch mapping — note numbers to equal-tempered frequencies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Reference tuning: A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;
/// Note number of A4.
pub const A4_NOTE: i32 = 69;

/// A semitone index on the MIDI scale (C4 = 60, A4 = 69).
///
/// In configuration files a pitch may be written either as an integer or as a
/// note name such as `"G3"` or `"Bb4"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "PitchRepr", into = "i32")]
pub struct Pitch(pub i32);

impl Pitch {
    /// Frequency in Hz under equal temperament.
    pub fn frequency(self) -> f64 {
        to_frequency(self.0)
    }

    /// Parse a note name ("C4", "F#3", "Bb5").
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        note_to_midi(name)
            .map(Pitch)
            .ok_or_else(|| ConfigError::NoteName(name.to_string()))
    }
}

impl From<i32> for Pitch {
    fn from(n: i32) -> Self {
        Pitch(n)
    }
}

impl From<Pitch> for i32 {
    fn from(p: Pitch) -> Self {
        p.0
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        let octave = self.0.div_euclid(12) - 1;
        let name = NAMES[self.0.rem_euclid(12) as usize];
        write!(f, "{name}{octave}")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PitchRepr {
    Number(i32),
    Name(String),
}

impl TryFrom<PitchRepr> for Pitch {
    type Error = ConfigError;

    fn try_from(repr: PitchRepr) -> Result<Self, Self::Error> {
        match repr {
            PitchRepr::Number(n) => Ok(Pitch(n)),
            PitchRepr::Name(s) => Pitch::from_name(&s),
        }
    }
}

/// Convert a note number to frequency: `440 * 2^((pitch - 69) / 12)`.
pub fn to_frequency(pitch: i32) -> f64 {
    A4_FREQUENCY * (2.0_f64).powf((pitch - A4_NOTE) as f64 / 12.0)
}

/// Parse a note name (e.g. "C4", "F#3", "Bb5") into a note number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let bytes = note.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let base_semitone = match bytes[0] as char {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut idx = 1;
    let mut semitone = base_semitone;

    if idx < bytes.len() {
        match bytes[idx] as char {
            '#' => {
                semitone += 1;
                idx += 1;
            }
            'b' => {
                semitone -= 1;
                idx += 1;
            }
            _ => {}
        }
    }

    let octave: i32 = note[idx..].parse().ok()?;

    // C4 = 60
    Some((octave + 1) * 12 + semitone)
}
