//! Amplitude envelopes as scheduled automation.
//!
//! An [`Envelope`] is a timeline of breakpoints on the engine clock. Each
//! breakpoint either jumps to a value or ramps to it (linearly or
//! exponentially) from the previous breakpoint. Note envelopes built with
//! [`Envelope::for_note`] always begin at 0 and are forced back to 0 at the
//! note's stop time, so voices never click.

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Exponential ramps cannot reach 0; both endpoints are clamped to this floor.
pub const EXPONENTIAL_FLOOR: f64 = 0.001;

/// Shortest attack of a note envelope, in seconds. A zero attack would
/// land the full level on the note's first sample.
pub const MIN_ATTACK: f64 = 0.001;

/// Interpolation curve of a ramp segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    #[default]
    Linear,
    Exponential,
}

/// Envelope stages of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Attack,
    Hold,
    Release,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Breakpoint {
    time: f64,
    value: f64,
    /// `None` jumps to `value` at `time`; `Some` ramps into it.
    curve: Option<Curve>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NoteTimes {
    start: f64,
    attack_end: f64,
    hold_end: f64,
    stop: f64,
}

/// Attack/hold/release parameters shared by every note of one voice role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeShape {
    /// Seconds from 0 to the target level.
    pub attack: f64,
    /// Seconds held at the target level before the release ramp begins.
    pub hold: f64,
    /// Curve of the release ramp down to the stop time.
    pub release_curve: Curve,
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        EnvelopeShape {
            attack: 0.5,
            hold: 0.0,
            release_curve: Curve::Linear,
        }
    }
}

/// Scheduled amplitude automation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    points: Vec<Breakpoint>,
    note: Option<NoteTimes>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the envelope of one note: silent at `start`, up to `level`
    /// over the attack, held, then released so that it is back at 0 by `stop`.
    ///
    /// Attack is at least [`MIN_ATTACK`]. Attack and hold are truncated if
    /// the note is too short to fit them.
    pub fn for_note(
        shape: &EnvelopeShape,
        level: f64,
        start: f64,
        stop: f64,
    ) -> Result<Self, EnvelopeError> {
        check_time(start)?;
        check_time(stop)?;
        check_value(level)?;
        if !(shape.attack.is_finite() && shape.attack >= 0.0) {
            return Err(EnvelopeError::RampDuration(shape.attack));
        }
        if !(shape.hold.is_finite() && shape.hold >= 0.0) {
            return Err(EnvelopeError::RampDuration(shape.hold));
        }
        if stop < start {
            return Err(EnvelopeError::RampDuration(stop - start));
        }

        let attack_end = (start + shape.attack.max(MIN_ATTACK)).min(stop);
        let hold_end = (attack_end + shape.hold).min(stop);

        let mut env = Envelope::new();
        env.set_value_at_time(0.0, start)?;
        env.ramp_to_value_at_time(level, attack_end, Curve::Linear)?;
        if hold_end > attack_end {
            env.set_value_at_time(level, hold_end)?;
        }
        match shape.release_curve {
            Curve::Linear => env.ramp_to_value_at_time(0.0, stop, Curve::Linear)?,
            Curve::Exponential => {
                env.ramp_to_value_at_time(EXPONENTIAL_FLOOR, stop, Curve::Exponential)?;
                env.set_value_at_time(0.0, stop)?;
            }
        }
        env.note = Some(NoteTimes {
            start,
            attack_end,
            hold_end,
            stop,
        });
        Ok(env)
    }

    /// Jump to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f64, time: f64) -> Result<(), EnvelopeError> {
        check_value(value)?;
        check_time(time)?;
        self.insert(Breakpoint {
            time,
            value,
            curve: None,
        });
        Ok(())
    }

    /// Ramp from the previous breakpoint so that `value` is reached at `end`.
    pub fn ramp_to_value_at_time(
        &mut self,
        value: f64,
        end: f64,
        curve: Curve,
    ) -> Result<(), EnvelopeError> {
        check_value(value)?;
        check_time(end)?;
        self.insert(Breakpoint {
            time: end,
            value,
            curve: Some(curve),
        });
        Ok(())
    }

    /// Ramp from whatever the envelope holds at `at` to `target`, taking
    /// `duration` seconds. A zero duration is a step.
    pub fn schedule_ramp(
        &mut self,
        target: f64,
        at: f64,
        duration: f64,
        curve: Curve,
    ) -> Result<(), EnvelopeError> {
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(EnvelopeError::RampDuration(duration));
        }
        check_value(target)?;
        check_time(at)?;
        if duration == 0.0 {
            return self.set_value_at_time(target, at);
        }
        let anchor = self.value_at(at);
        self.set_value_at_time(anchor, at)?;
        self.ramp_to_value_at_time(target, at + duration, curve)
    }

    /// Amplitude at engine time `t`. 0 before the first breakpoint.
    pub fn value_at(&self, t: f64) -> f64 {
        // Index of the first breakpoint strictly after t.
        let next = self.points.partition_point(|p| p.time <= t);
        if next == 0 {
            return 0.0;
        }
        let prev = self.points[next - 1];
        match self.points.get(next) {
            Some(&Breakpoint {
                time,
                value,
                curve: Some(curve),
            }) if time > prev.time => {
                let frac = (t - prev.time) / (time - prev.time);
                interpolate(prev.value, value, frac, curve)
            }
            _ => prev.value,
        }
    }

    /// Highest level this envelope reaches.
    pub fn peak(&self) -> f64 {
        self.points.iter().map(|p| p.value).fold(0.0, f64::max)
    }

    /// Time of the last breakpoint.
    pub fn end_time(&self) -> Option<f64> {
        self.points.last().map(|p| p.time)
    }

    /// Stage of a note envelope at `t`. Free-form envelopes only report
    /// `Pending` (before the first breakpoint), `Release` and `Finished`.
    pub fn stage_at(&self, t: f64) -> Stage {
        match self.note {
            Some(n) if t < n.start => Stage::Pending,
            Some(n) if t < n.attack_end => Stage::Attack,
            Some(n) if t < n.hold_end => Stage::Hold,
            Some(n) if t < n.stop => Stage::Release,
            Some(_) => Stage::Finished,
            None => match (self.points.first(), self.points.last()) {
                (Some(first), _) if t < first.time => Stage::Pending,
                (_, Some(last)) if t < last.time => Stage::Release,
                _ => Stage::Finished,
            },
        }
    }

    fn insert(&mut self, point: Breakpoint) {
        let idx = self.points.partition_point(|p| p.time <= point.time);
        self.points.insert(idx, point);
    }
}

fn interpolate(from: f64, to: f64, frac: f64, curve: Curve) -> f64 {
    let frac = frac.clamp(0.0, 1.0);
    match curve {
        Curve::Linear => from + (to - from) * frac,
        Curve::Exponential => {
            let from = from.max(EXPONENTIAL_FLOOR);
            let to = to.max(EXPONENTIAL_FLOOR);
            from * (to / from).powf(frac)
        }
    }
}

fn check_value(v: f64) -> Result<(), EnvelopeError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(EnvelopeError::Value(v))
    }
}

fn check_time(t: f64) -> Result<(), EnvelopeError> {
    if t.is_finite() {
        Ok(())
    } else {
        Err(EnvelopeError::Time(t))
    }
}
