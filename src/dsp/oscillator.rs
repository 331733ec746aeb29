//! Anti-aliased oscillators using PolyBLEP, with a sine FM modulator.

use std::f64::consts::TAU;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
}

impl Waveform {
    /// Map a choice index (0 = Sine, 1 = Saw, 2 = Square). Out-of-range
    /// indices fall back to Sine.
    pub fn from_choice(index: u32) -> Self {
        match index {
            1 => Waveform::Saw,
            2 => Waveform::Square,
            _ => Waveform::Sine,
        }
    }
}

/// A band-limited oscillator with pitch offset, linear gain and FM input.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    /// Linear output gain.
    gain: f64,
    /// Pitch offset in semitones.
    pitch: f64,
    /// FM modulator frequency in Hz.
    fm_frequency: f64,
    /// FM depth in Hz of frequency deviation.
    fm_depth: f64,
    /// Carrier phase [0, 1).
    phase: f64,
    /// Modulator phase [0, 1).
    fm_phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(sample_rate: f64) -> Self {
        Oscillator {
            waveform: Waveform::Sine,
            gain: 1.0,
            pitch: 0.0,
            fm_frequency: 0.0,
            fm_depth: 0.0,
            phase: 0.0,
            fm_phase: 0.0,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Refresh the per-block parameters. Phase is left untouched.
    pub fn set_params(
        &mut self,
        waveform: Waveform,
        gain_db: f64,
        pitch_semitones: f64,
        fm_frequency: f64,
        fm_depth: f64,
    ) {
        self.waveform = waveform;
        self.gain = db_to_gain(gain_db);
        self.pitch = pitch_semitones;
        self.fm_frequency = fm_frequency.max(0.0);
        self.fm_depth = fm_depth.max(0.0);
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Carrier frequency before FM for a given note frequency.
    pub fn pitched_frequency(&self, base_frequency: f64) -> f64 {
        base_frequency * 2.0_f64.powf(self.pitch / 12.0)
    }

    /// Generate the next sample for the given note frequency and advance phase.
    pub fn render_sample(&mut self, base_frequency: f64) -> f64 {
        let nyquist = self.sample_rate * 0.5;
        let modulation = self.fm_depth * (TAU * self.fm_phase).sin();
        let frequency = (self.pitched_frequency(base_frequency) + modulation).clamp(-nyquist, nyquist);

        let inc = frequency / self.sample_rate;
        let dt = inc.abs();
        let sample = match self.waveform {
            Waveform::Sine => self.sine(),
            Waveform::Saw => self.saw(dt),
            Waveform::Square => self.square(dt),
        };

        self.phase = (self.phase + inc).rem_euclid(1.0);
        self.fm_phase = (self.fm_phase + self.fm_frequency / self.sample_rate).rem_euclid(1.0);

        sample * self.gain
    }

    fn sine(&self) -> f64 {
        (TAU * self.phase).sin()
    }

    /// Naive sawtooth rising from -1 to +1, PolyBLEP-corrected at the wrap.
    fn saw(&self, dt: f64) -> f64 {
        let naive = 2.0 * self.phase - 1.0;
        naive - poly_blep(self.phase, dt)
    }

    fn square(&self, dt: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, dt);
        value -= poly_blep((self.phase + 0.5) % 1.0, dt);
        value
    }

    /// Reset both phases (note retrigger only).
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.fm_phase = 0.0;
    }
}

/// Convert decibels to linear gain; anything at or below -100 dB is silence.
pub fn db_to_gain(db: f64) -> f64 {
    if db <= -100.0 {
        0.0
    } else {
        10.0_f64.powf(db / 20.0)
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) anti-aliasing correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}
