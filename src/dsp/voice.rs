//! Voice graphs — the routing description of one note, and its sample generator.
//!
//! A [`VoiceGraph`] is backend-agnostic: it says which stages a note passes
//! through (tone → envelope → filter → buses → output) and with which
//! parameters. [`Voice`] is the software renderer's interpretation of it.

use serde::{Deserialize, Serialize};

use crate::error::{AmbientError, ConfigError};
use crate::sequencer::NoteRequest;

use super::envelope::{Envelope, Stage};
use super::filter::{BiquadFilter, FilterSettings};
use super::oscillator::{Oscillator, ToneGenerator};

pub type VoiceId = u64;

/// Musical role of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceRole {
    Pad,
    Bass,
    Melody,
}

/// Shared effect buses a voice can send into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bus {
    Dry,
    Reverb,
    Delay,
}

/// A voice's contribution to one bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusSend {
    pub bus: Bus,
    pub level: f64,
}

/// Stages in a voice's signal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Tone,
    Envelope,
    Filter,
    Bus(Bus),
    Output,
}

/// A directed edge between two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub from: Node,
    pub to: Node,
}

/// One fully wired note instance.
#[derive(Debug, Clone)]
pub struct VoiceGraph {
    pub id: VoiceId,
    pub role: VoiceRole,
    pub tone: ToneGenerator,
    pub envelope: Envelope,
    pub filter: FilterSettings,
    pub sends: Vec<BusSend>,
    /// Seconds the voice stays registered after its stop time.
    pub tail: f64,
}

impl VoiceGraph {
    /// The routing description, in signal order.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes = vec![
            Route {
                from: Node::Tone,
                to: Node::Envelope,
            },
            Route {
                from: Node::Envelope,
                to: Node::Filter,
            },
        ];
        for send in &self.sends {
            routes.push(Route {
                from: Node::Filter,
                to: Node::Bus(send.bus),
            });
        }
        for send in &self.sends {
            routes.push(Route {
                from: Node::Bus(send.bus),
                to: Node::Output,
            });
        }
        routes
    }

    pub fn start_time(&self) -> f64 {
        self.tone.start_time().unwrap_or(0.0)
    }

    pub fn stop_time(&self) -> f64 {
        self.tone.stop_time().unwrap_or(f64::INFINITY)
    }

    /// When the voice may be released: stop time plus the effect tail.
    pub fn release_time(&self) -> f64 {
        self.stop_time() + self.tail
    }

    pub fn is_expired(&self, t: f64) -> bool {
        t >= self.release_time()
    }

    pub fn stage_at(&self, t: f64) -> Stage {
        self.envelope.stage_at(t)
    }

    pub fn frequency(&self) -> f64 {
        self.tone.frequency()
    }

    /// Send level into `bus`, 0 if not routed there.
    pub fn send_level(&self, bus: Bus) -> f64 {
        self.sends
            .iter()
            .filter(|s| s.bus == bus)
            .map(|s| s.level)
            .sum()
    }
}

// ── Assembly ────────────────────────────────────────────────

/// Bus send levels applied to every voice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendLevels {
    pub dry: f64,
    pub reverb: f64,
    pub delay: f64,
}

impl Default for SendLevels {
    fn default() -> Self {
        SendLevels {
            dry: 0.0,
            reverb: 1.0,
            delay: 1.0,
        }
    }
}

/// Wires note requests into voice graphs.
///
/// When the reverb is unavailable, the reverb send is folded into the dry
/// bus so voices stay audible without the spatial tail.
#[derive(Debug, Clone)]
pub struct VoiceAssembler {
    sends: SendLevels,
    reverb_available: bool,
    tail: f64,
}

impl VoiceAssembler {
    pub fn new(sends: SendLevels, reverb_tail: Option<f64>) -> Self {
        VoiceAssembler {
            sends,
            reverb_available: reverb_tail.is_some(),
            tail: reverb_tail.unwrap_or(0.0),
        }
    }

    pub fn reverb_available(&self) -> bool {
        self.reverb_available
    }

    pub fn tail(&self) -> f64 {
        self.tail
    }

    pub fn assemble(&self, id: VoiceId, note: &NoteRequest) -> Result<VoiceGraph, AmbientError> {
        if !(note.duration.is_finite() && note.duration >= 0.0) {
            return Err(ConfigError::Duration {
                name: "note duration",
                value: note.duration,
            }
            .into());
        }
        note.filter.validate()?;

        let stop = note.start + note.duration;
        let mut tone = ToneGenerator::new(note.waveform);
        tone.set_frequency(note.pitch.frequency());
        tone.start(note.start)?;
        tone.stop(stop)?;

        let envelope = Envelope::for_note(&note.shape, note.level, note.start, stop)?;

        let (dry, reverb) = if self.reverb_available {
            (self.sends.dry, self.sends.reverb)
        } else {
            (self.sends.dry + self.sends.reverb, 0.0)
        };
        let sends = [
            (Bus::Reverb, reverb),
            (Bus::Delay, self.sends.delay),
            (Bus::Dry, dry),
        ]
        .into_iter()
        .filter(|&(_, level)| level > 0.0)
        .map(|(bus, level)| BusSend { bus, level })
        .collect();

        Ok(VoiceGraph {
            id,
            role: note.role,
            tone,
            envelope,
            filter: note.filter,
            sends,
            tail: self.tail,
        })
    }
}

// ── Rendering ───────────────────────────────────────────────

/// Per-voice DSP state: one oscillator feeding one filter, gated by the
/// graph's tone window and shaped by its envelope.
#[derive(Debug, Clone)]
pub struct Voice {
    oscillator: Oscillator,
    filter: BiquadFilter,
}

impl Voice {
    pub fn new(graph: &VoiceGraph, sample_rate: f64) -> Self {
        Voice {
            oscillator: graph.tone.oscillator(sample_rate),
            filter: BiquadFilter::new(graph.filter, sample_rate),
        }
    }

    /// Filtered, enveloped sample at engine time `t`.
    pub fn next_sample(&mut self, graph: &VoiceGraph, t: f64) -> f64 {
        if !graph.tone.is_sounding(t) {
            return 0.0;
        }
        let osc = self.oscillator.next_sample();
        let env = graph.envelope.value_at(t);
        self.filter.process(osc * env)
    }
}
