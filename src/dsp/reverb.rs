//! Convolution reverb with a procedurally generated impulse response.
//!
//! The impulse is stereo decaying noise, `uniform(-1, 1) * exp(-i / decay)`,
//! built once and shared read-only. Convolution runs as uniformly
//! partitioned overlap-save FFT convolution, so the cost per sample grows
//! with the number of partitions rather than the impulse length.

use std::sync::Arc;

use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::ReverbError;

/// Samples per partition (and the reverb's latency in samples).
pub const PARTITION_SIZE: usize = 512;

/// A stereo impulse response. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    channels: [Vec<f32>; 2],
    sample_rate: u32,
}

impl ImpulseResponse {
    /// Generate decaying stereo noise.
    ///
    /// `decay_divisor` sets the decay constant to `length / decay_divisor`
    /// (in samples). Each channel gets independent noise for decorrelation.
    /// Fails instead of aborting when the buffer exceeds `byte_limit` or the
    /// allocator refuses it.
    pub fn build<R: Rng + ?Sized>(
        length_seconds: f64,
        sample_rate: u32,
        decay_divisor: f64,
        byte_limit: usize,
        rng: &mut R,
    ) -> Result<Self, ReverbError> {
        if !(length_seconds.is_finite() && length_seconds > 0.0) || sample_rate == 0 {
            return Err(ReverbError::Length(length_seconds));
        }
        let len = (length_seconds * sample_rate as f64).round() as usize;
        let bytes = len
            .saturating_mul(2)
            .saturating_mul(std::mem::size_of::<f32>());
        if bytes > byte_limit {
            return Err(ReverbError::TooLarge {
                bytes,
                limit: byte_limit,
            });
        }

        let decay = (len as f64 / decay_divisor.max(f64::MIN_POSITIVE)).max(1.0);
        let mut channels: [Vec<f32>; 2] = [Vec::new(), Vec::new()];
        for data in channels.iter_mut() {
            data.try_reserve_exact(len)
                .map_err(|_| ReverbError::Allocation(bytes))?;
            data.extend((0..len).map(|i| {
                let noise: f64 = rng.gen_range(-1.0..=1.0);
                (noise * (-(i as f64) / decay).exp()) as f32
            }));
        }

        Ok(ImpulseResponse {
            channels,
            sample_rate,
        })
    }

    /// Wrap existing impulse data. Channels shorter than the longest are
    /// zero-padded.
    pub fn from_channels(mut left: Vec<f32>, mut right: Vec<f32>, sample_rate: u32) -> Self {
        let len = left.len().max(right.len());
        left.resize(len, 0.0);
        right.resize(len, 0.0);
        ImpulseResponse {
            channels: [left, right],
            sample_rate,
        }
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Mean per-channel energy (sum of squares).
    pub fn energy(&self) -> f64 {
        let total: f64 = self
            .channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        total / 2.0
    }
}

/// Streaming stereo convolver fed by a mono send.
///
/// Output is normalized to unit impulse energy and delayed by
/// [`PARTITION_SIZE`] samples.
pub struct ConvolutionReverb {
    impulse: Arc<ImpulseResponse>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// Spectra of the zero-padded impulse partitions, per channel.
    partitions: [Vec<Vec<Complex<f32>>>; 2],
    /// Ring of input block spectra, newest at `history_pos`.
    history: Vec<Vec<Complex<f32>>>,
    history_pos: usize,
    prev_input: Vec<f32>,
    input: Vec<f32>,
    output: [Vec<f32>; 2],
    pos: usize,
    scratch: Vec<Complex<f32>>,
    gain: f32,
}

/// Allocate `len` zeroed values, failing instead of aborting.
fn zeroed<T: Clone>(len: usize, value: T, bytes: usize) -> Result<Vec<T>, ReverbError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ReverbError::Allocation(bytes))?;
    v.resize(len, value);
    Ok(v)
}

impl ConvolutionReverb {
    /// Heap bytes a convolver for `impulse_len` samples needs, the impulse
    /// itself included: two channels of partition spectra plus the input
    /// spectrum history.
    pub fn footprint(impulse_len: usize) -> usize {
        let n = PARTITION_SIZE * 2;
        let count = impulse_len.div_ceil(PARTITION_SIZE).max(1);
        let spectrum = n.saturating_mul(std::mem::size_of::<Complex<f32>>());
        let impulse = impulse_len
            .saturating_mul(2)
            .saturating_mul(std::mem::size_of::<f32>());
        count
            .saturating_mul(3)
            .saturating_mul(spectrum)
            .saturating_add(impulse)
    }

    /// Plan the FFTs and transform the impulse partitions.
    ///
    /// Fails with [`ReverbError::TooLarge`] when [`footprint`](Self::footprint)
    /// exceeds `byte_limit`, and with [`ReverbError::Allocation`] when the
    /// allocator refuses a buffer.
    pub fn new(impulse: Arc<ImpulseResponse>, byte_limit: usize) -> Result<Self, ReverbError> {
        let bytes = Self::footprint(impulse.len());
        if bytes > byte_limit {
            return Err(ReverbError::TooLarge {
                bytes,
                limit: byte_limit,
            });
        }

        let block = PARTITION_SIZE;
        let n = block * 2;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        let count = impulse.len().div_ceil(block).max(1);
        let zero = Complex::new(0.0, 0.0);
        let mut partitions: [Vec<Vec<Complex<f32>>>; 2] = [Vec::new(), Vec::new()];
        for (ch, spectra) in partitions.iter_mut().enumerate() {
            spectra
                .try_reserve_exact(count)
                .map_err(|_| ReverbError::Allocation(bytes))?;
            let data = impulse.channel(ch);
            for k in 0..count {
                let mut spectrum = zeroed(n, zero, bytes)?;
                let start = (k * block).min(data.len());
                let end = ((k + 1) * block).min(data.len());
                for (slot, &s) in spectrum.iter_mut().zip(&data[start..end]) {
                    slot.re = s;
                }
                fft.process(&mut spectrum);
                spectra.push(spectrum);
            }
        }

        let mut history = Vec::new();
        history
            .try_reserve_exact(count)
            .map_err(|_| ReverbError::Allocation(bytes))?;
        for _ in 0..count {
            history.push(zeroed(n, zero, bytes)?);
        }

        let energy = impulse.energy();
        let gain = if energy > 0.0 {
            (1.0 / energy.sqrt()) as f32
        } else {
            0.0
        };

        Ok(ConvolutionReverb {
            impulse,
            fft,
            ifft,
            partitions,
            history,
            history_pos: 0,
            prev_input: vec![0.0; block],
            input: vec![0.0; block],
            output: [vec![0.0; block], vec![0.0; block]],
            pos: 0,
            scratch: vec![zero; n],
            gain,
        })
    }

    pub fn impulse(&self) -> &Arc<ImpulseResponse> {
        &self.impulse
    }

    /// Push one send sample, get one stereo wet sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> (f32, f32) {
        let out = (self.output[0][self.pos], self.output[1][self.pos]);
        self.input[self.pos] = input;
        self.pos += 1;
        if self.pos == PARTITION_SIZE {
            self.run_block();
            self.pos = 0;
        }
        out
    }

    /// Convolve a whole mono signal (plus the full tail) offline.
    pub fn apply(&mut self, signal: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let total = signal.len() + self.impulse.len() + PARTITION_SIZE;
        let mut left = Vec::with_capacity(total);
        let mut right = Vec::with_capacity(total);
        for i in 0..total {
            let (l, r) = self.process(signal.get(i).copied().unwrap_or(0.0));
            left.push(l);
            right.push(r);
        }
        // Drop the partition latency so output aligns with the input.
        left.drain(..PARTITION_SIZE);
        right.drain(..PARTITION_SIZE);
        (left, right)
    }

    fn run_block(&mut self) {
        let block = PARTITION_SIZE;
        let n = block * 2;
        let count = self.history.len();

        let spectrum = &mut self.history[self.history_pos];
        for (i, slot) in spectrum.iter_mut().enumerate() {
            let s = if i < block {
                self.prev_input[i]
            } else {
                self.input[i - block]
            };
            *slot = Complex::new(s, 0.0);
        }
        self.fft.process(spectrum);

        let scale = self.gain / n as f32;
        for ch in 0..2 {
            self.scratch.fill(Complex::new(0.0, 0.0));
            for (k, h) in self.partitions[ch].iter().enumerate() {
                let x = &self.history[(self.history_pos + count - k) % count];
                for ((acc, &hb), &xb) in self.scratch.iter_mut().zip(h).zip(x) {
                    *acc += hb * xb;
                }
            }
            self.ifft.process(&mut self.scratch);
            for (out, acc) in self.output[ch].iter_mut().zip(&self.scratch[block..]) {
                *out = acc.re * scale;
            }
        }

        self.history_pos = (self.history_pos + 1) % count;
        std::mem::swap(&mut self.prev_input, &mut self.input);
    }

    /// Silence the tail and forget all buffered input.
    pub fn clear(&mut self) {
        for spectrum in &mut self.history {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.prev_input.fill(0.0);
        self.input.fill(0.0);
        self.output[0].fill(0.0);
        self.output[1].fill(0.0);
        self.pos = 0;
        self.history_pos = 0;
    }
}
