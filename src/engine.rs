//! Playback engine — ties the sequencer, timeline, scheduler and render path
//! together behind `start` / `stop` / `is_playing`.
//!
//! The engine is driven by [`Engine::tick`]: each call schedules every bar
//! that has come due, releases expired voices and renders audio up to
//! slightly ahead of the clock. Something has to call `tick` regularly;
//! [`crate::player::AmbientPlayer`] does it from a background thread, tests
//! and the offline renderer do it by hand with a [`crate::clock::ManualClock`].

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::dsp::delay::FeedbackDelay;
use crate::dsp::renderer::{CHANNELS, RenderPath};
use crate::dsp::reverb::{ConvolutionReverb, ImpulseResponse};
use crate::dsp::voice::{VoiceAssembler, VoiceGraph};
use crate::error::{ConfigError, SinkError};
use crate::lifecycle::{SharedRegistry, VoiceRegistry, lock_or_recover};
use crate::scheduler::{BarSlot, Scheduler};
use crate::sequencer::{BarPlan, HarmonicSequencer};
use crate::sink::{OutputSink, StreamConfig};
use crate::timeline::{Section, SectionTimeline};

/// Frames handed to the sink per write.
const RENDER_CHUNK: usize = 1024;
/// Longest wait between ticks while playing, in seconds.
const MAX_TICK_INTERVAL: f64 = 0.025;
/// Render backlog beyond which the render path jumps to the clock instead
/// of catching up.
const MAX_RENDER_LAG: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built, never started.
    Uninitialized,
    Running,
    Stopped,
    /// Torn down for good. `start` is ignored from here on.
    Disposed,
}

pub struct Engine<C: Clock, S: OutputSink> {
    config: EngineConfig,
    clock: C,
    sink: S,
    state: EngineState,
    sequencer: HarmonicSequencer,
    timeline: SectionTimeline,
    scheduler: Scheduler,
    assembler: VoiceAssembler,
    registry: SharedRegistry,
    impulse: Option<Arc<ImpulseResponse>>,
    render: RenderPath,
    last_error: Option<SinkError>,
    write_failed: bool,
    bars_scheduled: u64,
}

impl<C: Clock, S: OutputSink> Engine<C, S> {
    /// Validate `config` and build everything that outlives a single session,
    /// the reverb impulse included.
    pub fn new(config: EngineConfig, clock: C, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // The impulse and the convolver share one byte limit. Either failing
        // leaves the engine dry.
        let (impulse, reverb) = if config.reverb.enabled {
            let built = ImpulseResponse::build(
                config.reverb.length,
                config.sample_rate,
                config.reverb.decay_divisor,
                config.reverb.max_bytes,
                &mut rng,
            )
            .and_then(|ir| {
                let ir = Arc::new(ir);
                let reverb = ConvolutionReverb::new(Arc::clone(&ir), config.reverb.max_bytes)?;
                Ok((ir, reverb))
            });
            match built {
                Ok((ir, reverb)) => {
                    debug!(samples = ir.len(), "reverb impulse built");
                    (Some(ir), Some(reverb))
                }
                Err(err) => {
                    warn!(%err, "reverb unavailable; routing voices dry");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let assembler = VoiceAssembler::new(config.sends, impulse.as_ref().map(|ir| ir.duration()));
        let sequencer = HarmonicSequencer::new(
            config.progression.clone(),
            config.scheduling.timing(),
            config.pad,
            config.bass,
            config.melody.clone(),
            StdRng::seed_from_u64(rng.next_u64()),
        );
        let timeline = SectionTimeline::new(config.timeline, config.sections);
        let scheduler = Scheduler::new(config.scheduling.bar_duration, config.scheduling.lookahead);
        let registry = VoiceRegistry::shared();
        let delay = FeedbackDelay::with_params(
            config.sample_rate as f64,
            config.delay.max_time,
            config.delay.time,
            config.delay.feedback,
        )?;
        let render = RenderPath::new(
            config.sample_rate,
            registry.clone(),
            reverb,
            delay,
            config.master_gain,
        );

        Ok(Engine {
            config,
            clock,
            sink,
            state: EngineState::Uninitialized,
            sequencer,
            timeline,
            scheduler,
            assembler,
            registry,
            impulse,
            render,
            last_error: None,
            write_failed: false,
            bars_scheduled: 0,
        })
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Begin playback. A running engine is stopped and started afresh, so
    /// there is never more than one schedule. If the output refuses to open
    /// the engine stays idle and the error is kept in [`Engine::last_error`].
    pub fn start(&mut self) {
        match self.state {
            EngineState::Disposed => {
                warn!("start ignored: engine disposed");
                return;
            }
            EngineState::Running => {
                debug!("start while running; restarting");
                self.stop();
            }
            EngineState::Uninitialized | EngineState::Stopped => {}
        }

        let stream = StreamConfig {
            sample_rate: self.config.sample_rate,
            channels: CHANNELS,
        };
        if let Err(err) = self.sink.open(&stream) {
            warn!(%err, "audio output unavailable; staying idle");
            self.last_error = Some(err);
            return;
        }

        let now = self.clock.now();
        self.last_error = None;
        self.write_failed = false;
        self.scheduler.begin(now);
        self.render.reset(now);
        self.state = EngineState::Running;
        info!(at = now, "playback started");
        self.tick();
    }

    /// Stop playback and release every voice at once. This is a hard cut:
    /// envelopes and effect tails are dropped, not faded. Safe to call at any
    /// time.
    pub fn stop(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        self.scheduler.cancel();
        let released = lock_or_recover(&self.registry).clear();
        let now = self.clock.now();
        self.render.reset(now);
        self.sink.close();
        self.state = EngineState::Stopped;
        info!(released, "playback stopped");
    }

    /// Stop and make the engine unusable.
    pub fn dispose(&mut self) {
        if self.state == EngineState::Disposed {
            return;
        }
        self.stop();
        self.state = EngineState::Disposed;
        debug!("engine disposed");
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Running
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    // ── Driving ─────────────────────────────────────────────

    /// Do all work that is due now. Returns the engine time by which `tick`
    /// should be called again, or `None` when not playing.
    pub fn tick(&mut self) -> Option<f64> {
        if self.state != EngineState::Running {
            return None;
        }
        let now = self.clock.now();

        let reclaimed = lock_or_recover(&self.registry).reclaim(now);
        if reclaimed > 0 {
            debug!(reclaimed, "voices released");
        }

        while let Some(slot) = self.scheduler.due(now) {
            self.schedule_bar(slot);
        }

        self.pump(now);

        let interval = now + MAX_TICK_INTERVAL;
        Some(
            self.scheduler
                .next_wake()
                .map_or(interval, |wake| wake.min(interval)),
        )
    }

    fn schedule_bar(&mut self, slot: BarSlot) {
        let (section, profile) = self.timeline.profile_at(slot.elapsed);
        let plan = self
            .sequencer
            .plan_bar(slot.index, slot.start, section, profile);
        self.bars_scheduled += 1;
        debug!(
            bar = plan.index,
            %section,
            notes = plan.notes.len(),
            "bar scheduled"
        );
        self.register_plan(&plan);
    }

    fn register_plan(&mut self, plan: &BarPlan) {
        let mut registry = lock_or_recover(&self.registry);
        for note in &plan.notes {
            let id = registry.next_id();
            match self.assembler.assemble(id, note) {
                Ok(graph) => {
                    registry.register(graph);
                }
                Err(err) => warn!(%err, pitch = %note.pitch, "note dropped"),
            }
        }
    }

    fn pump(&mut self, now: f64) {
        let ahead = self.config.scheduling.render_ahead;
        let target = now + ahead;
        if target - self.render.position() > MAX_RENDER_LAG + ahead {
            self.render.skip_to(now);
        }

        let sample_rate = self.render.sample_rate();
        while self.render.position() < target {
            let remaining = ((target - self.render.position()) * sample_rate).ceil() as usize;
            let frames = remaining.clamp(1, RENDER_CHUNK);
            let block = self.render.render(frames);
            if let Err(err) = self.sink.write(&block) {
                if !self.write_failed {
                    warn!(%err, "audio output write failed");
                    self.write_failed = true;
                }
                self.last_error = Some(err);
            }
        }
    }

    // ── Inspection ──────────────────────────────────────────

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Section at the current clock time, if playing.
    pub fn section_at_now(&self) -> Option<Section> {
        if !self.is_playing() {
            return None;
        }
        self.scheduler
            .elapsed(self.clock.now())
            .map(|elapsed| self.timeline.section_at(elapsed))
    }

    pub fn timeline(&self) -> &SectionTimeline {
        &self.timeline
    }

    pub fn sequencer(&self) -> &HarmonicSequencer {
        &self.sequencer
    }

    /// Registered voices in creation order.
    pub fn voice_snapshot(&self) -> Vec<Arc<VoiceGraph>> {
        lock_or_recover(&self.registry).snapshot()
    }

    pub fn active_voice_count(&self) -> usize {
        lock_or_recover(&self.registry).len()
    }

    /// Voices created over the engine's lifetime.
    pub fn voices_created(&self) -> u64 {
        lock_or_recover(&self.registry).created()
    }

    /// Bars scheduled over the engine's lifetime.
    pub fn bars_scheduled(&self) -> u64 {
        self.bars_scheduled
    }

    pub fn impulse(&self) -> Option<&Arc<ImpulseResponse>> {
        self.impulse.as_ref()
    }

    /// Whether voices are routed through the reverb.
    pub fn reverb_enabled(&self) -> bool {
        self.assembler.reverb_available() && self.render.has_reverb()
    }

    pub fn last_error(&self) -> Option<&SinkError> {
        self.last_error.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<C: Clock, S: OutputSink> Drop for Engine<C, S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
