//! Audio output backends.
//!
//! The engine renders interleaved stereo `f32` frames and hands them to an
//! [`OutputSink`]. The sink may refuse to open (no device, permission denied),
//! in which case the engine stays idle.

use std::sync::{Arc, Mutex};

use crate::error::SinkError;
use crate::lifecycle::lock_or_recover;

/// Format of the stream the engine writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

pub trait OutputSink: Send {
    /// Acquire the output. Called by every `start`.
    fn open(&mut self, config: &StreamConfig) -> Result<(), SinkError>;
    /// Write interleaved samples.
    fn write(&mut self, samples: &[f32]) -> Result<(), SinkError>;
    /// Release the output. Must tolerate being called when not open.
    fn close(&mut self);
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn open(&mut self, config: &StreamConfig) -> Result<(), SinkError> {
        (**self).open(config)
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), SinkError> {
        (**self).write(samples)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn open(&mut self, _config: &StreamConfig) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&mut self, _samples: &[f32]) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(&mut self) {}
}

#[derive(Debug, Default)]
struct BufferState {
    samples: Vec<f32>,
    config: Option<StreamConfig>,
    open: bool,
    opens: usize,
    refuse: Option<SinkError>,
}

/// Collects written samples in memory. Clones share the same buffer, so a
/// caller can keep a handle while the engine owns the sink.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    state: Arc<Mutex<BufferState>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `open` always fails with `error`.
    pub fn refusing(error: SinkError) -> Self {
        let sink = Self::new();
        lock_or_recover(&sink.state).refuse = Some(error);
        sink
    }

    pub fn samples(&self) -> Vec<f32> {
        lock_or_recover(&self.state).samples.clone()
    }

    /// Drain the collected samples.
    pub fn take(&self) -> Vec<f32> {
        std::mem::take(&mut lock_or_recover(&self.state).samples)
    }

    pub fn is_open(&self) -> bool {
        lock_or_recover(&self.state).open
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        lock_or_recover(&self.state).opens
    }

    pub fn stream_config(&self) -> Option<StreamConfig> {
        lock_or_recover(&self.state).config
    }
}

impl OutputSink for BufferSink {
    fn open(&mut self, config: &StreamConfig) -> Result<(), SinkError> {
        let mut state = lock_or_recover(&self.state);
        if let Some(err) = &state.refuse {
            return Err(err.clone());
        }
        state.open = true;
        state.opens += 1;
        state.config = Some(*config);
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), SinkError> {
        let mut state = lock_or_recover(&self.state);
        if !state.open {
            return Err(SinkError::Write("sink is closed".to_string()));
        }
        state.samples.extend_from_slice(samples);
        Ok(())
    }

    fn close(&mut self) {
        lock_or_recover(&self.state).open = false;
    }
}
