//! Real-time player — drives an [`Engine`] from a background thread.
//!
//! The worker sleeps until the engine's next wake time, ticks it, and exits
//! when its cancel channel is dropped. `stop` drops the channel and joins the
//! worker before stopping the engine, so no tick can run after `stop`
//! returns.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineState};
use crate::error::{ConfigError, SinkError};
use crate::lifecycle::lock_or_recover;
use crate::sink::OutputSink;

/// Shortest sleep between ticks.
const MIN_SLEEP: Duration = Duration::from_millis(1);

struct Worker {
    /// Dropping the sender tells the thread to exit.
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn shutdown(&mut self) {
        drop(self.cancel.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("playback thread panicked");
            }
        }
    }
}

pub struct AmbientPlayer<S: OutputSink + 'static> {
    engine: Arc<Mutex<Engine<SystemClock, S>>>,
    worker: Option<Worker>,
}

impl<S: OutputSink + 'static> AmbientPlayer<S> {
    pub fn new(config: EngineConfig, sink: S) -> Result<Self, ConfigError> {
        let engine = Engine::new(config, SystemClock::new(), sink)?;
        Ok(AmbientPlayer {
            engine: Arc::new(Mutex::new(engine)),
            worker: None,
        })
    }

    /// Start playback, replacing any session already running.
    pub fn start(&mut self) -> Result<(), SinkError> {
        self.stop();

        {
            let mut engine = lock_or_recover(&self.engine);
            engine.start();
            if !engine.is_playing() {
                return match engine.last_error() {
                    Some(err) => Err(err.clone()),
                    None => Ok(()),
                };
            }
        }

        let (cancel, cancelled) = mpsc::channel::<()>();
        let engine = Arc::clone(&self.engine);
        let spawned = thread::Builder::new()
            .name("ambient-playback".into())
            .spawn(move || run(engine, cancelled));

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker {
                    cancel: Some(cancel),
                    handle: Some(handle),
                });
                Ok(())
            }
            Err(err) => {
                lock_or_recover(&self.engine).stop();
                Err(SinkError::Unavailable(format!("cannot spawn playback thread: {err}")))
            }
        }
    }

    /// Stop playback. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        lock_or_recover(&self.engine).stop();
    }

    pub fn is_playing(&self) -> bool {
        lock_or_recover(&self.engine).is_playing()
    }

    /// Run `f` with the engine locked.
    pub fn with_engine<R>(&self, f: impl FnOnce(&Engine<SystemClock, S>) -> R) -> R {
        f(&lock_or_recover(&self.engine))
    }
}

impl<S: OutputSink + 'static> Drop for AmbientPlayer<S> {
    fn drop(&mut self) {
        self.stop();
        lock_or_recover(&self.engine).dispose();
    }
}

fn run<S: OutputSink>(engine: Arc<Mutex<Engine<SystemClock, S>>>, cancelled: mpsc::Receiver<()>) {
    debug!("playback thread started");
    loop {
        let sleep = {
            let mut engine = lock_or_recover(&engine);
            if engine.state() != EngineState::Running {
                break;
            }
            match engine.tick() {
                Some(wake) => {
                    let wait = (wake - engine.now()).max(0.0);
                    Duration::from_secs_f64(wait).max(MIN_SLEEP)
                }
                None => break,
            }
        };
        match cancelled.recv_timeout(sleep) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("playback thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{BufferSink, NullSink};

    fn small_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.sample_rate = 8000;
        config.seed = Some(11);
        config.reverb.length = 0.25;
        config
    }

    #[test]
    fn start_stop_cycle() {
        let mut player = AmbientPlayer::new(small_config(), NullSink).unwrap();
        assert!(!player.is_playing());
        player.start().unwrap();
        assert!(player.is_playing());
        thread::sleep(Duration::from_millis(50));
        player.stop();
        assert!(!player.is_playing());
        player.stop();
        assert_eq!(player.with_engine(|e| e.active_voice_count()), 0);
    }

    #[test]
    fn output_flows_while_playing() {
        let sink = BufferSink::new();
        let mut player = AmbientPlayer::new(small_config(), sink.clone()).unwrap();
        player.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        player.stop();
        assert!(!sink.samples().is_empty());
        assert!(!sink.is_open());
    }

    #[test]
    fn restart_keeps_single_worker() {
        let sink = BufferSink::new();
        let mut player = AmbientPlayer::new(small_config(), sink.clone()).unwrap();
        player.start().unwrap();
        player.start().unwrap();
        assert!(player.is_playing());
        assert_eq!(sink.open_count(), 2);
        assert_eq!(player.with_engine(|e| e.bars_scheduled()), 2);
        player.stop();
    }

    #[test]
    fn refused_output_reports_error() {
        let sink = BufferSink::refusing(SinkError::Unavailable("no device".into()));
        let mut player = AmbientPlayer::new(small_config(), sink).unwrap();
        assert_eq!(
            player.start(),
            Err(SinkError::Unavailable("no device".into()))
        );
        assert!(!player.is_playing());
    }
}
