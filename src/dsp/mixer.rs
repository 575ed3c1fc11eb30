//! Mixer — Sums the dry, reverb and delay buses into stereo output.

/// A stereo summing mixer with master gain and soft clipping.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    left: Vec<f64>,
    right: Vec<f64>,
}

impl Mixer {
    pub fn new(master_gain: f64) -> Self {
        Mixer {
            master_gain,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    /// Prepare `frames` frames of silence.
    pub fn clear(&mut self, frames: usize) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);
    }

    /// Add a stereo sample at frame `index`.
    pub fn add(&mut self, index: usize, left: f64, right: f64) {
        if index < self.left.len() {
            self.left[index] += left;
            self.right[index] += right;
        }
    }

    /// Interleaved output with master gain and soft clipping applied.
    pub fn output(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| {
                [
                    soft_clip(l * self.master_gain) as f32,
                    soft_clip(r * self.master_gain) as f32,
                ]
            })
            .collect()
    }

    /// Frames in the buffer.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer() {
        let mut m = Mixer::new(1.0);
        m.clear(128);
        let out = m.output();
        assert_eq!(out.len(), 256);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn accumulates_per_channel() {
        let mut m = Mixer::new(1.0);
        m.clear(4);
        m.add(0, 0.5, 0.1);
        m.add(0, 0.3, 0.1);
        m.add(1, 1.0, 0.0);
        m.add(9, 1.0, 1.0);
        let out = m.output();
        assert!((out[0] - soft_clip(0.8) as f32).abs() < 1e-6);
        assert!((out[1] - soft_clip(0.2) as f32).abs() < 1e-6);
        assert!((out[2] - soft_clip(1.0) as f32).abs() < 1e-6);
        assert_eq!(out[3], 0.0);
        assert_eq!(out[4], 0.0);
    }

    #[test]
    fn soft_clip_prevents_overflow() {
        let mut m = Mixer::new(2.0);
        m.clear(1);
        m.add(0, 100.0, -100.0);
        let out = m.output();
        assert!(out.iter().all(|s| s.abs() <= 1.0), "got {out:?}");
    }
}
