//! End-to-end lifecycle behaviour of the engine under a manual clock.

use std::sync::Arc;

use ambient_core::dsp::voice::{Bus, VoiceRole};
use ambient_core::error::SinkError;
use ambient_core::pitch::Pitch;
use ambient_core::{BufferSink, Engine, EngineConfig, EngineState, ManualClock, Section};

type TestEngine = Engine<ManualClock, BufferSink>;

fn small_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sample_rate = 8000;
    config.seed = Some(17);
    config.reverb.length = 0.5;
    config
}

fn engine_with(config: EngineConfig) -> (TestEngine, ManualClock, BufferSink) {
    let clock = ManualClock::new(0.0);
    let sink = BufferSink::new();
    let engine = Engine::new(config, clock.clone(), sink.clone()).unwrap();
    (engine, clock, sink)
}

fn engine() -> (TestEngine, ManualClock, BufferSink) {
    engine_with(small_config())
}

/// Advance the clock to `until` in steps of `step`, ticking each time.
fn run(engine: &mut TestEngine, clock: &ManualClock, until: f64, step: f64) {
    while clock.now() + step <= until + 1e-9 {
        clock.advance(step);
        engine.tick();
    }
}

fn pad_pitches_starting_in(engine: &TestEngine, from: f64, to: f64) -> Vec<f64> {
    engine
        .voice_snapshot()
        .iter()
        .filter(|v| v.role == VoiceRole::Pad && v.start_time() >= from && v.start_time() < to)
        .map(|v| v.frequency())
        .collect()
}

#[test]
fn stop_silences_and_schedules_nothing_more() {
    let (mut engine, clock, sink) = engine();
    engine.start();
    run(&mut engine, &clock, 10.0, 0.25);
    assert!(engine.active_voice_count() > 0);

    engine.stop();
    assert!(!engine.is_playing());
    assert_eq!(engine.active_voice_count(), 0);
    let created = engine.voices_created();
    let written = sink.samples().len();

    run(&mut engine, &clock, 40.0, 1.0);
    assert_eq!(engine.tick(), None);
    assert_eq!(engine.voices_created(), created);
    assert_eq!(engine.active_voice_count(), 0);
    assert_eq!(sink.samples().len(), written);
}

#[test]
fn restart_produces_a_single_schedule() {
    let (mut restarted, clock_a, _) = engine();
    restarted.start();
    clock_a.set(1.0);
    restarted.tick();
    restarted.stop();
    restarted.start();

    let (mut fresh, clock_b, _) = engine();
    clock_b.set(1.0);
    fresh.start();

    assert_eq!(restarted.active_voice_count(), fresh.active_voice_count());
    assert!(restarted.voice_snapshot().iter().all(|v| v.start_time() >= 1.0));

    for clock in [&clock_a, &clock_b] {
        clock.set(7.0);
    }
    restarted.tick();
    fresh.tick();
    assert_eq!(restarted.active_voice_count(), fresh.active_voice_count());
    // One chord per bar, never two overlapping copies.
    assert_eq!(pad_pitches_starting_in(&restarted, 7.0 - 0.1, 8.0).len(), 3);
}

#[test]
fn start_while_running_replaces_session() {
    let (mut engine, clock, sink) = engine();
    engine.start();
    clock.set(2.0);
    engine.start();
    assert!(engine.is_playing());
    assert_eq!(sink.open_count(), 2);
    assert!(engine.voice_snapshot().iter().all(|v| v.start_time() >= 2.0));
    assert_eq!(engine.section_at_now(), Some(Section::Intro));
}

#[test]
fn chord_follows_bar_index() {
    let config = small_config();
    let chords = config.progression.chords.clone();
    let (mut engine, clock, _) = engine_with(config);
    engine.start();

    for k in 0..8u64 {
        let bar_start = 6.0 * k as f64;
        clock.set(bar_start);
        engine.tick();
        let pads = pad_pitches_starting_in(&engine, bar_start, bar_start + 1.0);
        let expected: Vec<f64> = chords[(k % 4) as usize]
            .iter()
            .map(|p| p.frequency())
            .collect();
        assert_eq!(pads, expected, "bar {k}");
    }
}

#[test]
fn clock_jump_lands_in_chorus() {
    let (mut engine, clock, _) = engine();
    engine.start();
    clock.set(50.0);
    engine.tick();

    assert_eq!(engine.section_at_now(), Some(Section::Chorus));
    let pads: Vec<_> = engine
        .voice_snapshot()
        .into_iter()
        .filter(|v| v.role == VoiceRole::Pad && v.start_time() >= 48.0)
        .collect();
    assert_eq!(pads.len(), 3);
    for pad in &pads {
        assert!((pad.envelope.peak() - 0.04).abs() < 1e-12);
        // The resumed bar keeps its 48 s start, so its pads are already sounding.
        assert!(pad.envelope.value_at(50.0) > 0.0);
    }
    // Bars 1..7 were skipped, not played late.
    assert!(
        engine
            .voice_snapshot()
            .iter()
            .all(|v| v.start_time() < 6.0 || v.start_time() >= 48.0)
    );
}

#[test]
fn sections_shape_the_bass() {
    let (mut engine, clock, _) = engine();
    engine.start();
    let bass_in_bar = |engine: &TestEngine, start: f64| {
        engine
            .voice_snapshot()
            .iter()
            .filter(|v| v.role == VoiceRole::Bass && v.start_time() >= start && v.start_time() < start + 6.0)
            .count()
    };
    // Intro: one sustained note.
    assert_eq!(bass_in_bar(&engine, 0.0), 1);

    clock.set(12.0);
    engine.tick();
    // Verse: pulsed.
    assert_eq!(bass_in_bar(&engine, 12.0), 12);
    assert_eq!(
        engine
            .voice_snapshot()
            .iter()
            .find(|v| v.role == VoiceRole::Bass && v.start_time() >= 12.0)
            .map(|v| v.frequency()),
        Some(Pitch(53).frequency())
    );
}

#[test]
fn melody_never_plays_in_intro() {
    let mut config = small_config();
    config.sections.intro.melody_probability = 1.0;
    config.sections.verse.melody_probability = 1.0;
    let (mut engine, clock, _) = engine_with(config);
    engine.start();
    run(&mut engine, &clock, 11.0, 1.0);
    assert!(engine.voice_snapshot().iter().all(|v| v.role != VoiceRole::Melody));

    clock.set(12.0);
    engine.tick();
    let melody: Vec<_> = engine
        .voice_snapshot()
        .into_iter()
        .filter(|v| v.role == VoiceRole::Melody)
        .collect();
    assert_eq!(melody.len(), 1);
    assert!(melody[0].start_time() >= 12.0 && melody[0].stop_time() <= 18.0 + 1e-9);
}

#[test]
fn voices_are_reclaimed_over_long_runs() {
    let (mut engine, clock, _) = engine();
    engine.start();
    let mut peak = 0;
    while clock.now() < 600.0 {
        clock.advance(1.0);
        engine.tick();
        peak = peak.max(engine.active_voice_count());
    }
    assert!(engine.bars_scheduled() >= 100);
    // One bar of pulsed bass plus its neighbours, never the whole history.
    assert!(peak < 40, "peak {peak} active voices");
    assert!(engine.voices_created() > 1000);
}

#[test]
fn refused_output_leaves_engine_idle() {
    let clock = ManualClock::new(0.0);
    let sink = BufferSink::refusing(SinkError::Refused("permission denied".into()));
    let mut engine = Engine::new(small_config(), clock.clone(), sink.clone()).unwrap();

    engine.start();
    assert!(!engine.is_playing());
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert_eq!(
        engine.last_error(),
        Some(&SinkError::Refused("permission denied".into()))
    );
    clock.set(10.0);
    assert_eq!(engine.tick(), None);
    assert_eq!(engine.active_voice_count(), 0);
    assert!(sink.samples().is_empty());
}

#[test]
fn oversized_reverb_falls_back_to_dry() {
    let mut config = small_config();
    config.reverb.max_bytes = 1024;
    let (mut engine, clock, sink) = engine_with(config);

    assert!(engine.impulse().is_none());
    assert!(!engine.reverb_enabled());
    engine.start();
    assert!(engine.is_playing());
    for voice in engine.voice_snapshot() {
        assert_eq!(voice.send_level(Bus::Reverb), 0.0);
        assert_eq!(voice.send_level(Bus::Dry), 1.0);
        assert_eq!(voice.release_time(), voice.stop_time());
    }

    run(&mut engine, &clock, 2.0, 0.05);
    assert!(sink.samples().iter().any(|s| s.abs() > 1e-4));
}

#[test]
fn convolver_over_the_limit_falls_back_to_dry() {
    // The 32 kB impulse fits; its partitioned spectra do not.
    let mut config = small_config();
    config.reverb.max_bytes = 40_000;
    let (mut engine, clock, sink) = engine_with(config);

    assert!(engine.impulse().is_none());
    assert!(!engine.reverb_enabled());
    engine.start();
    for voice in engine.voice_snapshot() {
        assert_eq!(voice.send_level(Bus::Reverb), 0.0);
        assert_eq!(voice.tail, 0.0);
    }
    run(&mut engine, &clock, 1.0, 0.05);
    assert!(sink.samples().iter().any(|s| s.abs() > 1e-4));
}

#[test]
fn impulse_is_built_once_and_shared() {
    let (mut engine, clock, _) = engine();
    let impulse = Arc::clone(engine.impulse().unwrap());
    assert_eq!(impulse.len(), 4000);
    assert!(engine.reverb_enabled());

    engine.start();
    clock.set(3.0);
    engine.tick();
    engine.stop();
    engine.start();

    assert!(Arc::ptr_eq(&impulse, engine.impulse().unwrap()));
    assert!(engine.voice_snapshot().iter().all(|v| v.tail == 0.5));
}

#[test]
fn stop_is_idempotent() {
    let (mut never_started, _, sink) = engine();
    never_started.stop();
    never_started.stop();
    assert_eq!(never_started.state(), EngineState::Uninitialized);
    assert_eq!(sink.open_count(), 0);

    let (mut engine, _, sink) = engine();
    engine.start();
    engine.stop();
    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(!sink.is_open());
}

#[test]
fn disposed_engine_stays_down() {
    let (mut engine, clock, sink) = engine();
    engine.start();
    engine.dispose();
    assert_eq!(engine.state(), EngineState::Disposed);

    engine.start();
    clock.set(6.0);
    assert_eq!(engine.tick(), None);
    assert!(!engine.is_playing());
    assert_eq!(sink.open_count(), 1);
    assert_eq!(engine.active_voice_count(), 0);
}
