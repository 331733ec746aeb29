//! State-variable filter with per-sample cutoff modulation.

use std::f64::consts::PI;

/// Lowest cutoff the modulated filter will ever run at.
pub const MIN_CUTOFF: f64 = 20.0;
/// Highest cutoff, further limited to just below Nyquist at runtime.
pub const MAX_CUTOFF: f64 = 20_000.0;
/// Fraction of the sample rate the cutoff must stay below.
const NYQUIST_GUARD: f64 = 0.49;

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    BandPass,
    HighPass,
}

impl FilterType {
    /// Map a choice index (0 = LowPass, 1 = BandPass, 2 = HighPass).
    pub fn from_choice(index: u32) -> Self {
        match index {
            1 => FilterType::BandPass,
            2 => FilterType::HighPass,
            _ => FilterType::LowPass,
        }
    }
}

/// A 2-pole topology-preserving-transform state-variable filter.
///
/// The trapezoidal integrators keep the structure stable for any positive
/// cutoff below Nyquist and any positive resonance, which makes it safe to
/// sweep the cutoff every sample.
#[derive(Debug, Clone)]
pub struct StateVariableFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    /// Resonance (Q); damping is its reciprocal.
    pub resonance: f64,

    // Coefficients
    k: f64,
    a1: f64,
    a2: f64,
    a3: f64,

    // Integrator state
    ic1eq: f64,
    ic2eq: f64,

    sample_rate: f64,
    dirty: bool,
}

impl StateVariableFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = StateVariableFilter {
            filter_type,
            frequency: 1000.0,
            resonance: std::f64::consts::FRAC_1_SQRT_2,
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let g = (PI * self.frequency / self.sample_rate).tan();
        self.k = 1.0 / self.resonance;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let v3 = input - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        match self.filter_type {
            FilterType::LowPass => v2,
            FilterType::BandPass => v1,
            FilterType::HighPass => input - self.k * v1 - v2,
        }
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.dirty = true;
    }

    /// Set frequency and mark coefficients dirty.
    pub fn set_frequency(&mut self, freq: f64) {
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    /// Set resonance and mark coefficients dirty.
    pub fn set_resonance(&mut self, resonance: f64) {
        if resonance != self.resonance {
            self.resonance = resonance;
            self.dirty = true;
        }
    }
}

/// A filter whose cutoff is a base value plus envelope and LFO offsets.
#[derive(Debug, Clone)]
pub struct ModulatedFilter {
    filter: StateVariableFilter,
    base_cutoff: f64,
    envelope_offset: f64,
    lfo_offset: f64,
    sample_rate: f64,
}

impl ModulatedFilter {
    pub fn new(sample_rate: f64) -> Self {
        let mut filter = StateVariableFilter::new(FilterType::LowPass, sample_rate);
        filter.set_frequency(MAX_CUTOFF.min(sample_rate * NYQUIST_GUARD));
        ModulatedFilter {
            filter,
            base_cutoff: MAX_CUTOFF,
            envelope_offset: 0.0,
            lfo_offset: 0.0,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.filter.set_sample_rate(sample_rate);
        self.apply_cutoff();
    }

    /// Per-block base configuration. Resonance is clamped to the declared range.
    pub fn set_base(&mut self, filter_type: FilterType, cutoff: f64, resonance: f64) {
        if filter_type != self.filter.filter_type {
            self.filter.filter_type = filter_type;
        }
        self.base_cutoff = cutoff;
        self.filter.set_resonance(resonance.clamp(0.1, 2.0));
        self.apply_cutoff();
    }

    /// Supply the envelope contribution (depth × envelope level) and the LFO
    /// value, both in Hz of cutoff offset.
    pub fn set_modulation(&mut self, envelope_offset: f64, lfo_offset: f64) {
        self.envelope_offset = envelope_offset;
        self.lfo_offset = lfo_offset;
        self.apply_cutoff();
    }

    /// Cutoff actually used: base plus modulation, clamped to
    /// [`MIN_CUTOFF`, min(`MAX_CUTOFF`, just below Nyquist)].
    pub fn effective_cutoff(&self) -> f64 {
        let max = MAX_CUTOFF.min(self.sample_rate * NYQUIST_GUARD);
        let cutoff = self.base_cutoff + self.envelope_offset + self.lfo_offset;
        if cutoff.is_finite() {
            cutoff.clamp(MIN_CUTOFF, max)
        } else {
            max
        }
    }

    pub fn process(&mut self, sample: f64) -> f64 {
        self.filter.process(sample)
    }

    pub fn reset(&mut self) {
        self.filter.reset();
    }

    fn apply_cutoff(&mut self) {
        let cutoff = self.effective_cutoff();
        self.filter.set_frequency(cutoff);
    }
}
