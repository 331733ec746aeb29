//! DSP Engine: Pure Rust synthesis and processing for the synth voice path.
//!
//! Everything here is allocation-free once constructed, so the same code runs
//! in a host audio callback, in an AudioWorklet (via WASM) and in the offline
//! WAV renderer.

pub mod envelope;
pub mod filter;
pub mod lfo;
pub mod meter;
pub mod oscillator;
pub mod pool;
pub mod renderer;
pub mod reverb;
pub mod voice;
