use thiserror::Error;

/// Top-level error for the ambient engine.
#[derive(Debug, Error)]
pub enum AmbientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("tone generator error: {0}")]
    Tone(#[from] ToneError),
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("reverb error: {0}")]
    Reverb(#[from] ReverbError),
    #[error("output sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Rejected configuration values. Raised before anything is scheduled.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("feedback gain {0} must be in [0, 1)")]
    FeedbackGain(f64),
    #[error("{name} must be a finite, non-negative number of seconds, got {value}")]
    Duration { name: &'static str, value: f64 },
    #[error("{name} must be a finite, positive value, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },
    #[error("progression has {chords} chords but {bass} bass notes")]
    ProgressionMismatch { chords: usize, bass: usize },
    #[error("progression must contain at least one bar")]
    EmptyProgression,
    #[error("chord {0} has no notes")]
    EmptyChord(usize),
    #[error("melody scale must not be empty")]
    EmptyScale,
    #[error("unknown note name '{0}'")]
    NoteName(String),
    #[error("{name} of {value} exceeds the maximum of {max}")]
    AboveMaximum {
        name: &'static str,
        value: f64,
        max: f64,
    },
    #[error("delay buffer allocation of {0} bytes failed")]
    DelayAllocation(usize),
    #[error("delay time {time}s exceeds the delay buffer ({max}s)")]
    DelayTooLong { time: f64, max: f64 },
    #[error("invalid JSON configuration: {0}")]
    Json(String),
}

/// Misuse of a tone generator's start/stop contract.
#[derive(Debug, Error, PartialEq)]
pub enum ToneError {
    #[error("tone generator already started at {0}s")]
    AlreadyStarted(f64),
    #[error("tone generator stopped before it was started")]
    NotStarted,
    #[error("stop time {stop}s precedes start time {start}s")]
    StopBeforeStart { start: f64, stop: f64 },
}

/// Invalid envelope automation.
#[derive(Debug, Error, PartialEq)]
pub enum EnvelopeError {
    #[error("ramp duration must be finite and non-negative, got {0}")]
    RampDuration(f64),
    #[error("automation value must be finite, got {0}")]
    Value(f64),
    #[error("automation time must be finite, got {0}")]
    Time(f64),
}

/// Failure to build the reverb impulse response or its convolver.
#[derive(Debug, Error, PartialEq)]
pub enum ReverbError {
    #[error("reverb needs {bytes} bytes, limit is {limit}")]
    TooLarge { bytes: usize, limit: usize },
    #[error("reverb allocation of {0} bytes failed")]
    Allocation(usize),
    #[error("impulse response length must be positive, got {0}s")]
    Length(f64),
}

/// Output backend refused or failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SinkError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
    #[error("audio output refused to start: {0}")]
    Refused(String),
    #[error("audio output write failed: {0}")]
    Write(String),
}
