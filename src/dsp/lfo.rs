//! Low-frequency sine oscillator used as a filter modulation source.

use std::f64::consts::TAU;

#[derive(Debug, Clone)]
pub struct Lfo {
    /// Rate in Hz.
    frequency: f64,
    /// Output scale (cutoff offset in Hz at full swing).
    depth: f64,
    phase: f64,
    sample_rate: f64,
}

impl Lfo {
    pub fn new(sample_rate: f64) -> Self {
        Lfo {
            frequency: 0.0,
            depth: 0.0,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn set_params(&mut self, frequency: f64, depth: f64) {
        self.frequency = frequency.max(0.0);
        self.depth = depth.max(0.0);
    }

    /// Next modulation value in [-depth, depth].
    pub fn render_sample(&mut self) -> f64 {
        let value = (TAU * self.phase).sin() * self.depth;
        self.phase = (self.phase + self.frequency / self.sample_rate).rem_euclid(1.0);
        value
    }
}
