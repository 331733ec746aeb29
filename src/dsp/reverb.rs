//! Reverb effect: Schroeder/Freeverb-style algorithmic reverb.
//!
//! Uses parallel comb filters followed by series allpass filters.
//! All delay lines are allocated at construction; processing never allocates.

/// A comb filter delay line with damped feedback.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp1: f32,
    damp2: f32,
    filterstore: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback: 0.84,
            damp1: 0.2,
            damp2: 0.8,
            filterstore: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];

        // One-pole lowpass in the feedback path (damping)
        self.filterstore = output * self.damp2 + self.filterstore * self.damp1;

        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }

    fn set_damp(&mut self, damp: f32) {
        self.damp1 = damp;
        self.damp2 = 1.0 - damp;
    }

    fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filterstore = 0.0;
    }
}

/// An allpass filter delay line.
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback: 0.5,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let bufout = self.buffer[self.index];
        let output = bufout - input;

        self.buffer[self.index] = input + bufout * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

// Tuning constants (scaled for 44100 Hz sample rate)
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;

const FIXED_GAIN: f32 = 0.015;
const SCALE_WET: f32 = 3.0;
const SCALE_DAMP: f32 = 0.4;
const SCALE_ROOM: f32 = 0.28;
const OFFSET_ROOM: f32 = 0.7;

/// User-facing reverb settings, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    pub room_size: f32,
    pub damping: f32,
    pub width: f32,
    pub wet_level: f32,
    pub dry_level: f32,
    /// Infinite sustain: the tail recirculates without decay or new input.
    pub freeze: bool,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            width: 1.0,
            wet_level: 0.0,
            dry_level: 1.0,
            freeze: false,
        }
    }
}

/// A stereo algorithmic reverb using the Schroeder/Freeverb design.
#[derive(Debug, Clone)]
pub struct Reverb {
    comb_l: Vec<CombFilter>,
    comb_r: Vec<CombFilter>,
    allpass_l: Vec<AllpassFilter>,
    allpass_r: Vec<AllpassFilter>,

    params: ReverbParams,

    gain: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
}

impl Reverb {
    /// Create a new reverb with delay lines sized for `sample_rate`.
    pub fn new(sample_rate: f64) -> Self {
        let scale = sample_rate / 44100.0;
        let sized = |t: usize, spread: usize| ((t as f64) * scale + spread as f64) as usize;

        let comb_l = COMB_TUNING.iter().map(|&t| CombFilter::new(sized(t, 0))).collect();
        let comb_r = COMB_TUNING
            .iter()
            .map(|&t| CombFilter::new(sized(t, STEREO_SPREAD)))
            .collect();
        let allpass_l = ALLPASS_TUNING.iter().map(|&t| AllpassFilter::new(sized(t, 0))).collect();
        let allpass_r = ALLPASS_TUNING
            .iter()
            .map(|&t| AllpassFilter::new(sized(t, STEREO_SPREAD)))
            .collect();

        let mut reverb = Self {
            comb_l,
            comb_r,
            allpass_l,
            allpass_r,
            params: ReverbParams::default(),
            gain: FIXED_GAIN,
            wet1: 0.0,
            wet2: 0.0,
            dry: 1.0,
        };

        reverb.update_parameters();
        reverb
    }

    pub fn params(&self) -> ReverbParams {
        self.params
    }

    /// Replace the settings; values are clamped to [0, 1].
    pub fn set_params(&mut self, params: ReverbParams) {
        self.params = ReverbParams {
            room_size: params.room_size.clamp(0.0, 1.0),
            damping: params.damping.clamp(0.0, 1.0),
            width: params.width.clamp(0.0, 1.0),
            wet_level: params.wet_level.clamp(0.0, 1.0),
            dry_level: params.dry_level.clamp(0.0, 1.0),
            freeze: params.freeze,
        };
        self.update_parameters();
    }

    /// Push the current settings into the comb filters and output gains.
    fn update_parameters(&mut self) {
        let p = self.params;
        let (feedback, damp, gain) = if p.freeze {
            (1.0, 0.0, 0.0)
        } else {
            (p.room_size * SCALE_ROOM + OFFSET_ROOM, p.damping * SCALE_DAMP, FIXED_GAIN)
        };
        self.gain = gain;

        for comb in self.comb_l.iter_mut().chain(self.comb_r.iter_mut()) {
            comb.set_feedback(feedback);
            comb.set_damp(damp);
        }

        let wet = p.wet_level * SCALE_WET;
        self.wet1 = 0.5 * wet * (1.0 + p.width);
        self.wet2 = 0.5 * wet * (1.0 - p.width);
        self.dry = p.dry_level;
    }

    /// Process a stereo sample pair, returning the processed output.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * self.gain;

        let mut out_l = 0.0f32;
        let mut out_r = 0.0f32;

        for comb in &mut self.comb_l {
            out_l += comb.process(input);
        }
        for comb in &mut self.comb_r {
            out_r += comb.process(input);
        }

        for allpass in &mut self.allpass_l {
            out_l = allpass.process(out_l);
        }
        for allpass in &mut self.allpass_r {
            out_r = allpass.process(out_r);
        }

        let final_l = out_l * self.wet1 + out_r * self.wet2 + left * self.dry;
        let final_r = out_r * self.wet1 + out_l * self.wet2 + right * self.dry;

        (final_l, final_r)
    }

    /// Process a single mono sample through the left-channel network.
    #[inline]
    pub fn process_mono_sample(&mut self, sample: f32) -> f32 {
        let input = sample * self.gain;
        let mut out = 0.0f32;
        for comb in &mut self.comb_l {
            out += comb.process(input);
        }
        for allpass in &mut self.allpass_l {
            out = allpass.process(out);
        }
        out * self.wet1 + sample * self.dry
    }

    /// Process a block of stereo audio in-place.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    /// Process a block of mono audio in-place.
    pub fn process_mono(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.process_mono_sample(*s);
        }
    }

    /// Clear all internal buffers.
    pub fn clear(&mut self) {
        for comb in self.comb_l.iter_mut().chain(self.comb_r.iter_mut()) {
            comb.clear();
        }
        for allpass in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            allpass.clear();
        }
    }
}
