//! Software render path and offline WAV export.
//!
//! [`RenderPath`] turns the voices in the registry into interleaved stereo
//! frames: each voice feeds its sends into the dry, reverb and delay buses,
//! and the mixer sums the bus outputs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::AmbientError;
use crate::lifecycle::{SharedRegistry, lock_or_recover};
use crate::sink::BufferSink;

use super::delay::FeedbackDelay;
use super::mixer::Mixer;
use super::reverb::ConvolutionReverb;
use super::voice::{Bus, Voice, VoiceGraph, VoiceId};

/// Output channels of the render path.
pub const CHANNELS: u16 = 2;

pub struct RenderPath {
    sample_rate: f64,
    registry: SharedRegistry,
    voices: HashMap<VoiceId, Voice>,
    reverb: Option<ConvolutionReverb>,
    delay: FeedbackDelay,
    mixer: Mixer,
    origin: f64,
    frames_rendered: u64,
}

impl RenderPath {
    pub fn new(
        sample_rate: u32,
        registry: SharedRegistry,
        reverb: Option<ConvolutionReverb>,
        delay: FeedbackDelay,
        master_gain: f64,
    ) -> Self {
        RenderPath {
            sample_rate: sample_rate as f64,
            registry,
            voices: HashMap::new(),
            reverb,
            delay,
            mixer: Mixer::new(master_gain),
            origin: 0.0,
            frames_rendered: 0,
        }
    }

    /// Engine time of the next frame to be rendered.
    pub fn position(&self) -> f64 {
        self.origin + self.frames_rendered as f64 / self.sample_rate
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Render `frames` stereo frames, interleaved.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let graphs = lock_or_recover(&self.registry).snapshot();

        // Voice state follows the registry: new graphs get fresh state,
        // released graphs lose theirs.
        let mut active: Vec<(Arc<VoiceGraph>, Voice, [f64; 3])> = graphs
            .into_iter()
            .map(|graph| {
                let voice = self
                    .voices
                    .remove(&graph.id)
                    .unwrap_or_else(|| Voice::new(&graph, self.sample_rate));
                let sends = [
                    graph.send_level(Bus::Dry),
                    graph.send_level(Bus::Reverb),
                    graph.send_level(Bus::Delay),
                ];
                (graph, voice, sends)
            })
            .collect();
        self.voices.clear();

        self.mixer.clear(frames);
        for i in 0..frames {
            let t = self.origin + (self.frames_rendered + i as u64) as f64 / self.sample_rate;
            let mut buses = [0.0_f64; 3];
            for (graph, voice, sends) in active.iter_mut() {
                let s = voice.next_sample(graph, t);
                if s != 0.0 {
                    for (bus, level) in buses.iter_mut().zip(sends.iter()) {
                        *bus += s * level;
                    }
                }
            }
            let [dry, reverb_send, delay_send] = buses;

            let (rev_l, rev_r) = match self.reverb.as_mut() {
                Some(reverb) => reverb.process(reverb_send as f32),
                None => (0.0, 0.0),
            };
            let (del_l, del_r) = self.delay.process(delay_send as f32, delay_send as f32);

            self.mixer.add(
                i,
                dry + rev_l as f64 + del_l as f64,
                dry + rev_r as f64 + del_r as f64,
            );
        }
        self.frames_rendered += frames as u64;

        for (graph, voice, _) in active {
            self.voices.insert(graph.id, voice);
        }
        self.mixer.output()
    }

    /// Jump forward to `t` without rendering. Effect tails are dropped.
    pub fn skip_to(&mut self, t: f64) {
        if t <= self.position() {
            return;
        }
        let frames = ((t - self.origin) * self.sample_rate).floor() as u64;
        debug!(from = self.position(), to = t, "render path skipping ahead");
        self.frames_rendered = frames;
        self.clear_buses();
    }

    /// Restart rendering at engine time `origin` with silent buses.
    pub fn reset(&mut self, origin: f64) {
        self.origin = origin;
        self.frames_rendered = 0;
        self.clear_buses();
    }

    fn clear_buses(&mut self) {
        self.voices.clear();
        if let Some(reverb) = self.reverb.as_mut() {
            reverb.clear();
        }
        self.delay.clear();
    }

    pub fn has_reverb(&self) -> bool {
        self.reverb.is_some()
    }
}

// ── Offline rendering ───────────────────────────────────────

/// Clock step used when driving the engine offline.
const OFFLINE_STEP: f64 = 0.05;

/// Render `seconds` of the piece from the top, as interleaved stereo.
pub fn render_offline(config: &EngineConfig, seconds: f64) -> Result<Vec<f32>, AmbientError> {
    let clock = ManualClock::new(0.0);
    let sink = BufferSink::new();
    let mut engine = Engine::new(config.clone(), clock.clone(), sink.clone())?;

    engine.start();
    if let Some(err) = engine.last_error() {
        return Err(err.clone().into());
    }

    let seconds = seconds.max(0.0);
    let steps = (seconds / OFFLINE_STEP).ceil() as u64 + 1;
    for step in 1..=steps {
        clock.set(step as f64 * OFFLINE_STEP);
        engine.tick();
    }
    engine.stop();

    let wanted = (seconds * config.sample_rate as f64).round() as usize * CHANNELS as usize;
    let mut samples = sink.take();
    samples.truncate(wanted);
    Ok(samples)
}

/// Render `seconds` of the piece to a WAV file as bytes (16-bit stereo PCM).
pub fn render_wav(config: &EngineConfig, seconds: f64) -> Result<Vec<u8>, AmbientError> {
    let samples = render_offline(config, seconds)?;
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    Ok(encode_wav(&pcm, config.sample_rate, CHANNELS))
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}
