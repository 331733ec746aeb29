//! Parameter surface: identifiers, ranges and the lock-free parameter store.
//!
//! Each parameter lives in its own `AtomicU32` holding `f32` bits. The control
//! plane writes clamped real values; the audio thread takes one
//! [`ParamSnapshot`] per block and never holds a reference across the block.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use crate::dsp::filter::FilterType;
use crate::dsp::oscillator::Waveform;
use crate::dsp::reverb::ReverbParams;
use crate::dsp::voice::{AdsrParams, ModParams, OscParams, VoiceParams};

/// How a parameter's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Float,
    Int,
    Choice,
}

/// Declared range, default and display metadata for one parameter.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: ParamKind,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    /// Snapping interval for normalized (host/knob) writes; 0 disables it.
    pub step: f32,
    /// Skew of the normalized mapping; < 1 spends more travel on low values.
    pub skew: f32,
    pub unit: &'static str,
    #[serde(skip_serializing_if = "no_choices")]
    pub choices: &'static [&'static str],
}

fn no_choices(choices: &&'static [&'static str]) -> bool {
    choices.is_empty()
}

const WAVEFORMS: &[&str] = &["Sine", "Saw", "Square"];
const FILTER_TYPES: &[&str] = &["Low Pass", "Band Pass", "High Pass"];

const fn float(
    id: &'static str,
    name: &'static str,
    min: f32,
    max: f32,
    step: f32,
    skew: f32,
    default: f32,
    unit: &'static str,
) -> ParamSpec {
    ParamSpec { id, name, kind: ParamKind::Float, min, max, default, step, skew, unit, choices: &[] }
}

const fn int(id: &'static str, name: &'static str, min: f32, max: f32, default: f32, unit: &'static str) -> ParamSpec {
    ParamSpec { id, name, kind: ParamKind::Int, min, max, default, step: 1.0, skew: 1.0, unit, choices: &[] }
}

const fn choice(id: &'static str, name: &'static str, choices: &'static [&'static str], default: f32) -> ParamSpec {
    ParamSpec {
        id,
        name,
        kind: ParamKind::Choice,
        min: 0.0,
        max: (choices.len() - 1) as f32,
        default,
        step: 1.0,
        skew: 1.0,
        unit: "",
        choices,
    }
}

macro_rules! params {
    ($($variant:ident => $spec:expr,)*) => {
        /// Stable parameter identifiers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ParamId {
            $($variant,)*
        }

        impl ParamId {
            pub const ALL: &'static [ParamId] = &[$(ParamId::$variant,)*];
        }

        /// Specs indexed by `ParamId as usize`.
        pub const PARAM_SPECS: &[ParamSpec] = &[$($spec,)*];
    };
}

params! {
    Osc1 => choice("OSC1", "Oscillator 1", WAVEFORMS, 0.0),
    Osc2 => choice("OSC2", "Oscillator 2", WAVEFORMS, 0.0),
    Osc1Gain => float("OSC1GAIN", "Oscillator 1 Gain", -40.0, 0.2, 0.1, 1.0, 0.1, "dB"),
    Osc2Gain => float("OSC2GAIN", "Oscillator 2 Gain", -40.0, 0.2, 0.1, 1.0, 0.1, "dB"),
    Osc1Pitch => int("OSC1PITCH", "Oscillator 1 Pitch", -48.0, 48.0, 0.0, "st"),
    Osc2Pitch => int("OSC2PITCH", "Oscillator 2 Pitch", -48.0, 48.0, 0.0, "st"),
    Osc1FmFreq => float("OSC1FMFREQ", "Oscillator 1 FM Frequency", 0.0, 1000.0, 0.1, 1.0, 0.0, "Hz"),
    Osc2FmFreq => float("OSC2FMFREQ", "Oscillator 2 FM Frequency", 0.0, 1000.0, 0.1, 1.0, 0.0, "Hz"),
    Osc1FmDepth => float("OSC1FMDEPTH", "Oscillator 1 FM Depth", 0.0, 100.0, 0.1, 1.0, 0.0, ""),
    Osc2FmDepth => float("OSC2FMDEPTH", "Oscillator 2 FM Depth", 0.0, 100.0, 0.1, 1.0, 0.0, ""),
    Lfo1Freq => float("LFO1FREQ", "LFO1 Frequency", 0.0, 20.0, 0.1, 1.0, 0.0, "Hz"),
    Lfo1Depth => float("LFO1DEPTH", "LFO1 Depth", 0.0, 10000.0, 0.1, 0.3, 0.0, ""),
    FilterType => choice("FILTERTYPE", "Filter Type", FILTER_TYPES, 0.0),
    FilterCutoff => float("FILTERCUTOFF", "Filter Cutoff", 20.0, 20000.0, 0.1, 0.6, 20000.0, "Hz"),
    FilterResonance => float("FILTERRESONANCE", "Filter Resonance", 0.1, 2.0, 0.1, 1.0, 0.1, ""),
    Attack => float("ATTACK", "Attack", 0.1, 1.0, 0.1, 1.0, 0.1, "s"),
    Decay => float("DECAY", "Decay", 0.1, 1.0, 0.1, 1.0, 0.1, "s"),
    Sustain => float("SUSTAIN", "Sustain", 0.1, 1.0, 0.1, 1.0, 1.0, ""),
    Release => float("RELEASE", "Release", 0.1, 3.0, 0.1, 1.0, 0.4, "s"),
    FilterAdsrDepth => float("FILTERADSRDEPTH", "Filter ADSR Depth", 0.0, 10000.0, 0.1, 0.3, 10000.0, ""),
    FilterAttack => float("FILTERATTACK", "Filter Attack", 0.0, 1.0, 0.01, 1.0, 0.01, "s"),
    FilterDecay => float("FILTERDECAY", "Filter Decay", 0.0, 1.0, 0.1, 1.0, 0.1, "s"),
    FilterSustain => float("FILTERSUSTAIN", "Filter Sustain", 0.0, 1.0, 0.1, 1.0, 1.0, ""),
    FilterRelease => float("FILTERRELEASE", "Filter Release", 0.0, 3.0, 0.1, 1.0, 0.1, "s"),
    ReverbSize => float("REVERBSIZE", "Reverb Size", 0.0, 1.0, 0.1, 1.0, 0.0, ""),
    ReverbWidth => float("REVERBWIDTH", "Reverb Width", 0.0, 1.0, 0.1, 1.0, 1.0, ""),
    ReverbDamping => float("REVERBDAMPING", "Reverb Damping", 0.0, 1.0, 0.1, 1.0, 0.5, ""),
    ReverbDry => float("REVERBDRY", "Reverb Dry", 0.0, 1.0, 0.1, 1.0, 1.0, ""),
    ReverbWet => float("REVERBWET", "Reverb Wet", 0.0, 1.0, 0.1, 1.0, 0.0, ""),
    ReverbFreeze => float("REVERBFREEZE", "Reverb Freeze", 0.0, 1.0, 0.1, 1.0, 0.0, ""),
}

pub const PARAM_COUNT: usize = PARAM_SPECS.len();

impl ParamId {
    pub fn spec(self) -> &'static ParamSpec {
        &PARAM_SPECS[self as usize]
    }

    pub fn key(self) -> &'static str {
        self.spec().id
    }

    /// Look up an identifier such as `"FILTERCUTOFF"`. Case-sensitive.
    pub fn from_key(key: &str) -> Option<ParamId> {
        ParamId::ALL.iter().copied().find(|id| id.key() == key)
    }
}

impl ParamSpec {
    /// Clamp a real value into range. Int and choice parameters round to the
    /// nearest whole number; NaN falls back to the default.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        let value = match self.kind {
            ParamKind::Float => value,
            ParamKind::Int | ParamKind::Choice => value.round(),
        };
        value.clamp(self.min, self.max)
    }

    /// Map a normalized [0, 1] position to a real value, honoring skew and step.
    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let p = if normalized.is_finite() { normalized.clamp(0.0, 1.0) } else { 0.0 };
        let p = if self.skew != 1.0 && p > 0.0 { (p.ln() / self.skew).exp() } else { p };
        let mut value = self.min + (self.max - self.min) * p;
        if self.step > 0.0 {
            value = self.min + ((value - self.min) / self.step).round() * self.step;
        }
        self.clamp(value)
    }

    /// Map a real value to its normalized [0, 1] position.
    pub fn to_normalized(&self, value: f32) -> f32 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }
        let p = (self.clamp(value) - self.min) / range;
        if self.skew != 1.0 { p.powf(self.skew) } else { p }
    }
}

/// Outcome of applying a parameter patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatchReport {
    /// Number of known identifiers written.
    pub applied: usize,
    /// Identifiers that were not recognised.
    pub ignored: Vec<String>,
}

/// Lock-free store holding the current value of every parameter.
#[derive(Debug)]
pub struct ParamStore {
    values: [AtomicU32; PARAM_COUNT],
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamStore {
    /// A store initialised with every parameter's default.
    pub fn new() -> Self {
        ParamStore {
            values: std::array::from_fn(|i| AtomicU32::new(PARAM_SPECS[i].default.to_bits())),
        }
    }

    pub fn get(&self, id: ParamId) -> f32 {
        let value = f32::from_bits(self.values[id as usize].load(Ordering::Relaxed));
        if value.is_finite() { value } else { id.spec().default }
    }

    /// Write a real value, clamped into range. Returns the stored value.
    pub fn set(&self, id: ParamId, value: f32) -> f32 {
        let clamped = id.spec().clamp(value);
        self.values[id as usize].store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }

    /// Write from a normalized [0, 1] host/knob position.
    pub fn set_normalized(&self, id: ParamId, normalized: f32) -> f32 {
        self.set(id, id.spec().from_normalized(normalized))
    }

    pub fn get_normalized(&self, id: ParamId) -> f32 {
        id.spec().to_normalized(self.get(id))
    }

    /// Write by string identifier; `None` if the identifier is unknown.
    pub fn set_by_key(&self, key: &str, value: f64) -> Option<f32> {
        ParamId::from_key(key).map(|id| {
            let spec = id.spec();
            // Clamp before narrowing so values beyond f32 range still land on a bound.
            let value = if value.is_nan() { value } else { value.clamp(spec.min as f64, spec.max as f64) };
            self.set(id, value as f32)
        })
    }

    pub fn get_by_key(&self, key: &str) -> Option<f32> {
        ParamId::from_key(key).map(|id| self.get(id))
    }

    /// Apply a mapping of identifier to real value exactly as manual edits
    /// would be applied. Unknown identifiers are skipped and reported.
    pub fn apply_patch<I, K>(&self, patch: I) -> PatchReport
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut report = PatchReport::default();
        for (key, value) in patch {
            let key = key.as_ref();
            match self.set_by_key(key, value) {
                Some(_) => report.applied += 1,
                None => {
                    log::debug!("ignoring unknown parameter {key}");
                    report.ignored.push(key.to_string());
                }
            }
        }
        report
    }

    /// Restore every parameter to its default.
    pub fn reset(&self) {
        for id in ParamId::ALL {
            self.set(*id, id.spec().default);
        }
    }

    /// Read every parameter once, by value.
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            values: std::array::from_fn(|i| self.get(ParamId::ALL[i])),
        }
    }
}

/// A by-value copy of all parameters, taken once per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    values: [f32; PARAM_COUNT],
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        ParamSnapshot {
            values: std::array::from_fn(|i| PARAM_SPECS[i].default),
        }
    }
}

impl ParamSnapshot {
    pub fn get(&self, id: ParamId) -> f32 {
        self.values[id as usize]
    }

    fn real(&self, id: ParamId) -> f64 {
        self.get(id) as f64
    }

    fn index(&self, id: ParamId) -> u32 {
        self.get(id).round().max(0.0) as u32
    }

    pub fn voice_params(&self) -> VoiceParams {
        use ParamId as P;
        let osc = |choice, gain, pitch, fm_freq, fm_depth| OscParams {
            waveform: Waveform::from_choice(self.index(choice)),
            gain_db: self.real(gain),
            pitch: self.real(pitch),
            fm_frequency: self.real(fm_freq),
            fm_depth: self.real(fm_depth),
        };
        VoiceParams {
            osc1: osc(P::Osc1, P::Osc1Gain, P::Osc1Pitch, P::Osc1FmFreq, P::Osc1FmDepth),
            osc2: osc(P::Osc2, P::Osc2Gain, P::Osc2Pitch, P::Osc2FmFreq, P::Osc2FmDepth),
            amp: AdsrParams {
                attack: self.real(P::Attack),
                decay: self.real(P::Decay),
                sustain: self.real(P::Sustain),
                release: self.real(P::Release),
            },
            filter_env: AdsrParams {
                attack: self.real(P::FilterAttack),
                decay: self.real(P::FilterDecay),
                sustain: self.real(P::FilterSustain),
                release: self.real(P::FilterRelease),
            },
            modulation: ModParams {
                filter_type: FilterType::from_choice(self.index(P::FilterType)),
                cutoff: self.real(P::FilterCutoff),
                resonance: self.real(P::FilterResonance),
                env_depth: self.real(P::FilterAdsrDepth),
                lfo_frequency: self.real(P::Lfo1Freq),
                lfo_depth: self.real(P::Lfo1Depth),
            },
        }
    }

    pub fn reverb_params(&self) -> ReverbParams {
        ReverbParams {
            room_size: self.get(ParamId::ReverbSize),
            damping: self.get(ParamId::ReverbDamping),
            width: self.get(ParamId::ReverbWidth),
            wet_level: self.get(ParamId::ReverbWet),
            dry_level: self.get(ParamId::ReverbDry),
            freeze: self.get(ParamId::ReverbFreeze) >= 0.5,
        }
    }
}
