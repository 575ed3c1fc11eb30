//! Section timeline — maps elapsed play time to intro/verse/chorus/outro.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A named phase of the piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Intro,
    Verse,
    Chorus,
    Outro,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Intro => "intro",
            Section::Verse => "verse",
            Section::Chorus => "chorus",
            Section::Outro => "outro",
        };
        f.write_str(name)
    }
}

/// What happens once the outro has played out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapPolicy {
    /// Verse → chorus → outro again, forever. The intro plays once.
    #[default]
    LoopToVerse,
    /// Stay in the outro indefinitely.
    HoldOutro,
    /// Start over from the intro.
    Restart,
}

/// How the bass is played in a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BassPattern {
    /// Re-triggered on a fixed subdivision of the bar.
    Pulsed,
    /// One note held for the whole bar.
    Sustained,
}

/// Dynamics of one section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionProfile {
    /// Target amplitude of each pad voice.
    pub pad_level: f64,
    /// Target amplitude of each bass voice.
    pub bass_level: f64,
    pub bass_pattern: BassPattern,
    /// Chance per bar of a melody note.
    pub melody_probability: f64,
}

impl SectionProfile {
    fn validate(&self, section: Section) -> Result<(), ConfigError> {
        for (name, value) in [("pad level", self.pad_level), ("bass level", self.bass_level)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }
        if !(0.0..=1.0).contains(&self.melody_probability) {
            return Err(ConfigError::OutOfUnitRange {
                name: match section {
                    Section::Intro => "intro melody probability",
                    Section::Verse => "verse melody probability",
                    Section::Chorus => "chorus melody probability",
                    Section::Outro => "outro melody probability",
                },
                value: self.melody_probability,
            });
        }
        Ok(())
    }
}

/// One profile per section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionProfiles {
    pub intro: SectionProfile,
    pub verse: SectionProfile,
    pub chorus: SectionProfile,
    pub outro: SectionProfile,
}

impl SectionProfiles {
    pub fn get(&self, section: Section) -> &SectionProfile {
        match section {
            Section::Intro => &self.intro,
            Section::Verse => &self.verse,
            Section::Chorus => &self.chorus,
            Section::Outro => &self.outro,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for section in [Section::Intro, Section::Verse, Section::Chorus, Section::Outro] {
            self.get(section).validate(section)?;
        }
        Ok(())
    }
}

impl Default for SectionProfiles {
    fn default() -> Self {
        SectionProfiles {
            intro: SectionProfile {
                pad_level: 0.03,
                bass_level: 0.06,
                bass_pattern: BassPattern::Sustained,
                melody_probability: 0.0,
            },
            verse: SectionProfile {
                pad_level: 0.03,
                bass_level: 0.06,
                bass_pattern: BassPattern::Pulsed,
                melody_probability: 0.2,
            },
            chorus: SectionProfile {
                pad_level: 0.04,
                bass_level: 0.06,
                bass_pattern: BassPattern::Pulsed,
                melody_probability: 0.2,
            },
            outro: SectionProfile {
                pad_level: 0.03,
                bass_level: 0.06,
                bass_pattern: BassPattern::Sustained,
                melody_probability: 0.2,
            },
        }
    }
}

/// Section lengths in seconds, and the wrap policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub intro: f64,
    pub verse: f64,
    pub chorus: f64,
    pub outro: f64,
    pub wrap: WrapPolicy,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        TimelineConfig {
            intro: 12.0,
            verse: 36.0,
            chorus: 24.0,
            outro: 24.0,
            wrap: WrapPolicy::LoopToVerse,
        }
    }
}

impl TimelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("intro length", self.intro),
            ("verse length", self.verse),
            ("chorus length", self.chorus),
            ("outro length", self.outro),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Duration { name, value });
            }
        }
        Ok(())
    }

    /// Length of one full pass, intro included.
    pub fn total(&self) -> f64 {
        self.intro + self.verse + self.chorus + self.outro
    }
}

/// Timeline of sections with their dynamics.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionTimeline {
    config: TimelineConfig,
    profiles: SectionProfiles,
}

impl SectionTimeline {
    pub fn new(config: TimelineConfig, profiles: SectionProfiles) -> Self {
        SectionTimeline { config, profiles }
    }

    /// Section playing `elapsed` seconds into the session.
    pub fn section_at(&self, elapsed: f64) -> Section {
        let c = &self.config;
        let total = c.total();
        let t = if elapsed < total {
            elapsed.max(0.0)
        } else {
            match c.wrap {
                WrapPolicy::HoldOutro => return Section::Outro,
                WrapPolicy::Restart if total > 0.0 => elapsed % total,
                WrapPolicy::LoopToVerse if total - c.intro > 0.0 => {
                    c.intro + (elapsed - c.intro) % (total - c.intro)
                }
                // Nothing but an intro to repeat.
                _ => return Section::Intro,
            }
        };

        if t < c.intro {
            Section::Intro
        } else if t < c.intro + c.verse {
            Section::Verse
        } else if t < c.intro + c.verse + c.chorus {
            Section::Chorus
        } else {
            Section::Outro
        }
    }

    /// Start and end of a section's first occurrence.
    pub fn bounds(&self, section: Section) -> (f64, f64) {
        let c = &self.config;
        let verse = c.intro;
        let chorus = verse + c.verse;
        let outro = chorus + c.chorus;
        match section {
            Section::Intro => (0.0, verse),
            Section::Verse => (verse, chorus),
            Section::Chorus => (chorus, outro),
            Section::Outro => (outro, c.total()),
        }
    }

    pub fn profile(&self, section: Section) -> &SectionProfile {
        self.profiles.get(section)
    }

    pub fn profile_at(&self, elapsed: f64) -> (Section, &SectionProfile) {
        let section = self.section_at(elapsed);
        (section, self.profile(section))
    }

    pub fn wrap(&self) -> WrapPolicy {
        self.config.wrap
    }
}

impl Default for SectionTimeline {
    fn default() -> Self {
        SectionTimeline::new(TimelineConfig::default(), SectionProfiles::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_wrap(wrap: WrapPolicy) -> SectionTimeline {
        SectionTimeline::new(
            TimelineConfig {
                wrap,
                ..TimelineConfig::default()
            },
            SectionProfiles::default(),
        )
    }

    #[test]
    fn default_thresholds() {
        let tl = SectionTimeline::default();
        assert_eq!(tl.section_at(0.0), Section::Intro);
        assert_eq!(tl.section_at(11.99), Section::Intro);
        assert_eq!(tl.section_at(12.0), Section::Verse);
        assert_eq!(tl.section_at(47.9), Section::Verse);
        assert_eq!(tl.section_at(48.0), Section::Chorus);
        assert_eq!(tl.section_at(50.0), Section::Chorus);
        assert_eq!(tl.section_at(71.9), Section::Chorus);
        assert_eq!(tl.section_at(72.0), Section::Outro);
        assert_eq!(tl.section_at(95.9), Section::Outro);
    }

    #[test]
    fn negative_elapsed_is_intro() {
        assert_eq!(SectionTimeline::default().section_at(-3.0), Section::Intro);
    }

    #[test]
    fn loop_to_verse_skips_intro() {
        let tl = with_wrap(WrapPolicy::LoopToVerse);
        // One pass is 96s; the loop (verse..outro) is 84s long.
        assert_eq!(tl.section_at(96.0), Section::Verse);
        assert_eq!(tl.section_at(96.0 + 36.0), Section::Chorus);
        assert_eq!(tl.section_at(96.0 + 60.0), Section::Outro);
        assert_eq!(tl.section_at(96.0 + 84.0), Section::Verse);
    }

    #[test]
    fn hold_outro_never_leaves() {
        let tl = with_wrap(WrapPolicy::HoldOutro);
        for t in [96.0, 200.0, 10_000.0] {
            assert_eq!(tl.section_at(t), Section::Outro);
        }
    }

    #[test]
    fn restart_replays_intro() {
        let tl = with_wrap(WrapPolicy::Restart);
        assert_eq!(tl.section_at(96.0), Section::Intro);
        assert_eq!(tl.section_at(96.0 + 12.0), Section::Verse);
    }

    #[test]
    fn chorus_is_louder_than_verse() {
        let tl = SectionTimeline::default();
        assert_eq!(tl.profile(Section::Chorus).pad_level, 0.04);
        assert_eq!(tl.profile(Section::Verse).pad_level, 0.03);
        let (section, profile) = tl.profile_at(50.0);
        assert_eq!(section, Section::Chorus);
        assert_eq!(profile.pad_level, 0.04);
    }

    #[test]
    fn intro_and_outro_sustain_bass() {
        let tl = SectionTimeline::default();
        assert_eq!(tl.profile(Section::Intro).bass_pattern, BassPattern::Sustained);
        assert_eq!(tl.profile(Section::Outro).bass_pattern, BassPattern::Sustained);
        assert_eq!(tl.profile(Section::Verse).bass_pattern, BassPattern::Pulsed);
        assert_eq!(tl.profile(Section::Intro).melody_probability, 0.0);
    }

    #[test]
    fn bounds_follow_config() {
        let tl = SectionTimeline::default();
        assert_eq!(tl.bounds(Section::Chorus), (48.0, 72.0));
        assert_eq!(tl.bounds(Section::Outro), (72.0, 96.0));
    }

    #[test]
    fn zero_length_sections_are_skipped() {
        let tl = SectionTimeline::new(
            TimelineConfig {
                intro: 0.0,
                verse: 10.0,
                chorus: 0.0,
                outro: 5.0,
                wrap: WrapPolicy::LoopToVerse,
            },
            SectionProfiles::default(),
        );
        assert_eq!(tl.section_at(0.0), Section::Verse);
        assert_eq!(tl.section_at(10.0), Section::Outro);
        assert_eq!(tl.section_at(15.0), Section::Verse);
    }

    #[test]
    fn invalid_lengths_rejected() {
        let config = TimelineConfig {
            verse: -1.0,
            ..TimelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Duration { .. })));
    }
}
