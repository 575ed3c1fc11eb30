//! DSP — the per-voice signal chain and the shared effect buses.
//!
//! Everything here is plain Rust with no audio backend, so the same code
//! renders through a real-time sink, offline to WAV, or inside WASM.

pub mod delay;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod renderer;
pub mod reverb;
pub mod voice;
