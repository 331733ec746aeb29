//! A single synth voice: two oscillators, amplitude and filter envelopes,
//! an LFO and a modulated filter.

use super::envelope::{Envelope, Stage};
use super::filter::{FilterType, ModulatedFilter};
use super::lfo::Lfo;
use super::oscillator::{Oscillator, Waveform};

/// Per-block settings for one oscillator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscParams {
    pub waveform: Waveform,
    pub gain_db: f64,
    pub pitch: f64,
    pub fm_frequency: f64,
    pub fm_depth: f64,
}

/// Attack/decay/release in seconds, sustain as a level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParams {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

/// Per-block filter and LFO settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModParams {
    pub filter_type: FilterType,
    pub cutoff: f64,
    pub resonance: f64,
    /// Cutoff offset in Hz at full filter-envelope level.
    pub env_depth: f64,
    pub lfo_frequency: f64,
    pub lfo_depth: f64,
}

/// Everything a voice reads from the parameter snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub osc1: OscParams,
    pub osc2: OscParams,
    pub amp: AdsrParams,
    pub filter_env: AdsrParams,
    pub modulation: ModParams,
}

impl Default for VoiceParams {
    fn default() -> Self {
        let osc = OscParams {
            waveform: Waveform::Sine,
            gain_db: 0.1,
            pitch: 0.0,
            fm_frequency: 0.0,
            fm_depth: 0.0,
        };
        VoiceParams {
            osc1: osc,
            osc2: osc,
            amp: AdsrParams { attack: 0.1, decay: 0.1, sustain: 1.0, release: 0.4 },
            filter_env: AdsrParams { attack: 0.01, decay: 0.1, sustain: 1.0, release: 0.1 },
            modulation: ModParams {
                filter_type: FilterType::LowPass,
                cutoff: 20_000.0,
                resonance: 0.1,
                env_depth: 10_000.0,
                lfo_frequency: 0.0,
                lfo_depth: 0.0,
            },
        }
    }
}

/// A single monophonic note renderer.
#[derive(Debug, Clone)]
pub struct Voice {
    osc1: Oscillator,
    osc2: Oscillator,
    amp_envelope: Envelope,
    filter_envelope: Envelope,
    filter: ModulatedFilter,
    lfo: Lfo,
    env_depth: f64,

    active: bool,
    note: u8,
    /// Velocity gain [0, 1].
    velocity: f64,
    frequency: f64,
    /// Allocation stamp, used to find the oldest voice when stealing.
    started_at: u64,
}

impl Voice {
    pub fn new(sample_rate: f64) -> Self {
        let mut voice = Voice {
            osc1: Oscillator::new(sample_rate),
            osc2: Oscillator::new(sample_rate),
            amp_envelope: Envelope::new(sample_rate),
            filter_envelope: Envelope::new(sample_rate),
            filter: ModulatedFilter::new(sample_rate),
            lfo: Lfo::new(sample_rate),
            env_depth: 0.0,
            active: false,
            note: 0,
            velocity: 0.0,
            frequency: 0.0,
            started_at: 0,
        };
        voice.apply_params(&VoiceParams::default());
        voice
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.osc1.set_sample_rate(sample_rate);
        self.osc2.set_sample_rate(sample_rate);
        self.amp_envelope.set_sample_rate(sample_rate);
        self.filter_envelope.set_sample_rate(sample_rate);
        self.filter.set_sample_rate(sample_rate);
        self.lfo.set_sample_rate(sample_rate);
    }

    /// Refresh oscillators, envelopes and modulation from a snapshot.
    /// Never retriggers anything.
    pub fn apply_params(&mut self, params: &VoiceParams) {
        let set_osc = |osc: &mut Oscillator, p: &OscParams| {
            osc.set_params(p.waveform, p.gain_db, p.pitch, p.fm_frequency, p.fm_depth);
        };
        set_osc(&mut self.osc1, &params.osc1);
        set_osc(&mut self.osc2, &params.osc2);

        let a = params.amp;
        self.amp_envelope.update(a.attack, a.decay, a.sustain, a.release);
        let f = params.filter_env;
        self.filter_envelope.update(f.attack, f.decay, f.sustain, f.release);

        let m = params.modulation;
        self.update_mod_params(
            m.filter_type,
            m.cutoff,
            m.resonance,
            m.env_depth,
            m.lfo_frequency,
            m.lfo_depth,
        );
    }

    pub fn update_mod_params(
        &mut self,
        filter_type: FilterType,
        cutoff: f64,
        resonance: f64,
        env_depth: f64,
        lfo_frequency: f64,
        lfo_depth: f64,
    ) {
        self.filter.set_base(filter_type, cutoff, resonance);
        self.env_depth = env_depth;
        self.lfo.set_params(lfo_frequency, lfo_depth);
    }

    /// Start playing a note.
    pub fn start_note(&mut self, note: u8, velocity: f64, params: &VoiceParams, stamp: u64) {
        self.apply_params(params);
        if self.amp_envelope.is_idle() {
            self.filter.reset();
        }
        self.note = note;
        self.velocity = velocity.clamp(0.0, 1.0);
        self.frequency = midi_to_frequency(note, 440.0);
        self.started_at = stamp;
        self.osc1.reset();
        self.osc2.reset();
        self.amp_envelope.trigger();
        self.filter_envelope.trigger();
        self.active = true;
    }

    /// Release the note, or cut it dead when `allow_tail_off` is false.
    pub fn stop_note(&mut self, allow_tail_off: bool) {
        if allow_tail_off {
            self.amp_envelope.release();
            self.filter_envelope.release();
            if self.amp_envelope.is_idle() {
                self.active = false;
            }
        } else {
            self.amp_envelope.reset();
            self.filter_envelope.reset();
            self.filter.reset();
            self.active = false;
        }
    }

    /// Add this voice's output into `output`.
    pub fn render_next_block(&mut self, output: &mut [f64]) {
        if !self.active {
            return;
        }

        for out in output.iter_mut() {
            let osc = self.osc1.render_sample(self.frequency) + self.osc2.render_sample(self.frequency);
            let amp = self.amp_envelope.advance();
            let filter_env = self.filter_envelope.advance();
            let lfo = self.lfo.render_sample();

            self.filter.set_modulation(self.env_depth * filter_env, lfo);
            *out += self.filter.process(osc * amp) * self.velocity;

            if self.amp_envelope.is_idle() {
                break;
            }
        }

        if self.amp_envelope.is_idle() {
            self.stop_note(false);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Active and not yet released.
    pub fn is_key_down(&self) -> bool {
        self.active && !matches!(self.amp_envelope.stage(), Stage::Release | Stage::Idle)
    }

    pub fn is_releasing(&self) -> bool {
        self.active && self.amp_envelope.stage() == Stage::Release
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn amp_level(&self) -> f64 {
        self.amp_envelope.level()
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn effective_cutoff(&self) -> f64 {
        self.filter.effective_cutoff()
    }
}

/// Convert a MIDI note number to frequency using the given tuning pitch.
///
/// `tuning_pitch` is the frequency of A4 (MIDI 69).
pub fn midi_to_frequency(note: u8, tuning_pitch: f64) -> f64 {
    tuning_pitch * 2.0_f64.powf((note as f64 - 69.0) / 12.0)
}
