//! Block renderer: the per-callback pipeline.
//!
//! Each block: copy input channels into the output and clear the rest, take
//! one parameter snapshot, render the voice pool (split at note-event
//! offsets), run the reverb in place and update the meter. Nothing in
//! [`SynthProcessor::process_block`] allocates, locks or logs.

use std::sync::Arc;

use crate::dsp::meter::{Meter, MeterReader};
use crate::dsp::pool::{DEFAULT_VOICES, VoicePool};
use crate::dsp::reverb::Reverb;
use crate::error::LayoutError;
use crate::params::ParamStore;

/// Host-negotiated engine settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub max_block_size: usize,
    /// 1 (mono) or 2 (stereo).
    pub output_channels: usize,
    /// Must not exceed `output_channels`.
    pub input_channels: usize,
    pub num_voices: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100.0,
            max_block_size: 512,
            output_channels: 2,
            input_channels: 0,
            num_voices: DEFAULT_VOICES,
        }
    }
}

impl EngineConfig {
    /// Check the channel layout and stream settings.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if !(1..=2).contains(&self.output_channels) {
            return Err(LayoutError::UnsupportedOutput(self.output_channels));
        }
        if self.input_channels > self.output_channels {
            return Err(LayoutError::TooManyInputs {
                inputs: self.input_channels,
                outputs: self.output_channels,
            });
        }
        check_stream(self.sample_rate, self.max_block_size)
    }
}

fn check_stream(sample_rate: f64, max_block_size: usize) -> Result<(), LayoutError> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(LayoutError::InvalidSampleRate(sample_rate));
    }
    if max_block_size == 0 {
        return Err(LayoutError::ZeroBlockSize);
    }
    Ok(())
}

/// What a timed note event does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEventKind {
    NoteOn { note: u8, velocity: f32 },
    NoteOff { note: u8 },
    AllNotesOff { hard: bool },
}

/// A note event at a sample offset inside the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub offset: usize,
    pub kind: NoteEventKind,
}

impl NoteEvent {
    pub fn note_on(offset: usize, note: u8, velocity: f32) -> Self {
        NoteEvent { offset, kind: NoteEventKind::NoteOn { note, velocity } }
    }

    pub fn note_off(offset: usize, note: u8) -> Self {
        NoteEvent { offset, kind: NoteEventKind::NoteOff { note } }
    }

    pub fn all_notes_off(offset: usize, hard: bool) -> Self {
        NoteEvent { offset, kind: NoteEventKind::AllNotesOff { hard } }
    }
}

/// The synthesizer: voice pool, shared reverb and meter behind one
/// block-processing entry point.
pub struct SynthProcessor {
    config: EngineConfig,
    params: Arc<ParamStore>,
    pool: VoicePool,
    reverb: Reverb,
    meter: Meter,
}

impl SynthProcessor {
    /// Build a processor with its own default parameter store.
    pub fn new(config: EngineConfig) -> Result<Self, LayoutError> {
        Self::with_params(config, Arc::new(ParamStore::new()))
    }

    /// Build a processor reading from a shared parameter store.
    pub fn with_params(config: EngineConfig, params: Arc<ParamStore>) -> Result<Self, LayoutError> {
        if let Err(e) = config.validate() {
            log::warn!("rejecting engine layout: {e}");
            return Err(e);
        }
        log::info!(
            "preparing synth: {} Hz, block {}, {} out / {} in, {} voices",
            config.sample_rate,
            config.max_block_size,
            config.output_channels,
            config.input_channels,
            config.num_voices
        );

        let mut reverb = Reverb::new(config.sample_rate);
        reverb.set_params(params.snapshot().reverb_params());

        Ok(SynthProcessor {
            pool: VoicePool::new(config.num_voices, config.sample_rate, config.max_block_size),
            reverb,
            meter: Meter::new(),
            params,
            config,
        })
    }

    /// Re-negotiate sample rate and block size. Silences every voice and
    /// clears the reverb tail. Not real-time safe.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), LayoutError> {
        if let Err(e) = check_stream(sample_rate, max_block_size) {
            log::warn!("rejecting prepare: {e}");
            return Err(e);
        }
        log::info!("re-preparing synth: {sample_rate} Hz, block {max_block_size}");

        if sample_rate == self.config.sample_rate {
            self.reverb.clear();
        } else {
            // Delay lines are sized for the sample rate.
            let reverb_params = self.reverb.params();
            self.reverb = Reverb::new(sample_rate);
            self.reverb.set_params(reverb_params);
        }
        self.config.sample_rate = sample_rate;
        self.config.max_block_size = max_block_size;
        self.pool.prepare(sample_rate, max_block_size);
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared handle for the control plane.
    pub fn params(&self) -> Arc<ParamStore> {
        Arc::clone(&self.params)
    }

    pub fn meter_reader(&self) -> MeterReader {
        self.meter.reader()
    }

    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    pub fn voice_pool(&self) -> &VoicePool {
        &self.pool
    }

    /// Velocity 0 is treated as a note-off.
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        if velocity <= 0.0 || !velocity.is_finite() {
            self.pool.note_off(note);
        } else {
            self.pool.note_on(note, velocity.min(1.0) as f64);
        }
    }

    pub fn note_off(&mut self, note: u8) {
        self.pool.note_off(note);
    }

    pub fn all_notes_off(&mut self, hard: bool) {
        self.pool.all_notes_off(hard);
    }

    /// Render one block with no timed events.
    pub fn render(&mut self, input: &[&[f32]], output: &mut [&mut [f32]], num_samples: usize) {
        self.process_block(input, output, num_samples, &[]);
    }

    /// Render one block, applying `events` at their sample offsets.
    ///
    /// Events are applied in slice order; an offset earlier than the previous
    /// event's is applied at the previous offset, and offsets past the end of
    /// the block are applied after the last sample.
    pub fn process_block(
        &mut self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        num_samples: usize,
        events: &[NoteEvent],
    ) {
        let n = output
            .iter()
            .map(|ch| ch.len())
            .min()
            .unwrap_or(0)
            .min(num_samples);

        for (i, channel) in output.iter_mut().enumerate() {
            let channel = &mut channel[..n];
            match input.get(i) {
                Some(src) if src.len() >= n => channel.copy_from_slice(&src[..n]),
                Some(src) => {
                    channel[..src.len()].copy_from_slice(src);
                    channel[src.len()..].fill(0.0);
                }
                None => channel.fill(0.0),
            }
        }

        let snapshot = self.params.snapshot();
        self.pool.apply_params(&snapshot.voice_params());
        self.reverb.set_params(snapshot.reverb_params());

        let mut cursor = 0;
        for event in events {
            let at = event.offset.clamp(cursor, n);
            self.render_voices(output, cursor, at);
            cursor = at;
            self.apply_event(event.kind);
        }
        self.render_voices(output, cursor, n);

        match output {
            [] => {}
            [mono] => {
                let mono = &mut mono[..n];
                self.reverb.process_mono(mono);
                let view: [&[f32]; 1] = [mono];
                self.meter.process_rms(&view);
                self.meter.process_peak(&view);
            }
            [left, right, ..] => {
                let (left, right) = (&mut left[..n], &mut right[..n]);
                self.reverb.process_block(left, right);
                let view: [&[f32]; 2] = [left, right];
                self.meter.process_rms(&view);
                self.meter.process_peak(&view);
            }
        }
    }

    fn apply_event(&mut self, kind: NoteEventKind) {
        match kind {
            NoteEventKind::NoteOn { note, velocity } => self.note_on(note, velocity),
            NoteEventKind::NoteOff { note } => self.note_off(note),
            NoteEventKind::AllNotesOff { hard } => self.all_notes_off(hard),
        }
    }

    /// Render `start..end` in chunks no larger than the pool's scratch bus.
    fn render_voices(&mut self, output: &mut [&mut [f32]], start: usize, end: usize) {
        let chunk = self.pool.max_block_size();
        let mut pos = start;
        while pos < end {
            let len = (end - pos).min(chunk);
            self.pool.render_next_block(output, pos, len);
            pos += len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamId, ParamStore};

    const SR: f64 = 44100.0;
    const BLOCK: usize = 512;

    fn synth() -> SynthProcessor {
        SynthProcessor::new(EngineConfig::default()).unwrap()
    }

    /// Render one stereo block and return the peak absolute sample.
    fn render_peak(synth: &mut SynthProcessor, n: usize) -> f32 {
        let mut left = vec![0.0f32; n];
        let mut right = vec![0.0f32; n];
        {
            let mut out: [&mut [f32]; 2] = [&mut left, &mut right];
            synth.render(&[], &mut out, n);
        }
        left.iter().chain(right.iter()).fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn note_on_produces_sound_and_metering() {
        let mut s = synth();
        let reader = s.meter_reader();
        s.note_on(60, 1.0);

        let first = render_peak(&mut s, BLOCK);
        assert!(first > 0.0, "first block should already be ramping up");
        assert!(reader.rms() > 0.0);

        // Default attack is 0.1 s.
        let attack_blocks = (0.1 * SR) as usize / BLOCK + 1;
        for _ in 0..attack_blocks {
            render_peak(&mut s, BLOCK);
        }
        let peak = render_peak(&mut s, BLOCK);
        assert!(peak > 0.5, "full-level sine should be loud, got {peak}");
        assert!(reader.rms() > 0.1);
        assert!((reader.peak() - peak).abs() < 1e-6);
    }

    #[test]
    fn long_release_rings_then_goes_idle() {
        let mut s = synth();
        s.params().set(ParamId::Release, 3.0);
        s.note_on(60, 1.0);

        // Through attack and decay into sustain.
        let hold_blocks = (0.3 * SR) as usize / BLOCK;
        for _ in 0..hold_blocks {
            render_peak(&mut s, BLOCK);
        }
        s.note_off(60);

        let ringing_blocks = (2.9 * SR) as usize / BLOCK;
        for i in 0..ringing_blocks {
            let peak = render_peak(&mut s, BLOCK);
            assert!(peak > 0.0, "release went silent early at block {i}");
        }
        assert_eq!(s.active_voices(), 1);

        let tail_blocks = (0.2 * SR) as usize / BLOCK;
        for _ in 0..tail_blocks {
            render_peak(&mut s, BLOCK);
        }
        assert_eq!(s.active_voices(), 0, "voice should be idle after the release");
        assert_eq!(render_peak(&mut s, BLOCK), 0.0);
    }

    #[test]
    fn sixth_note_steals_the_oldest_voice() {
        let mut s = synth();
        for note in 60..66 {
            s.note_on(note, 1.0);
        }
        assert_eq!(s.active_voices(), 5);
        let notes: Vec<u8> = s.voice_pool().voices().iter().map(|v| v.note()).collect();
        assert_eq!(notes, vec![65, 61, 62, 63, 64]);
    }

    #[test]
    fn velocity_zero_is_note_off() {
        let mut s = synth();
        s.note_on(60, 1.0);
        render_peak(&mut s, BLOCK);
        s.note_on(60, 0.0);
        assert!(s.voice_pool().voices()[0].is_releasing());
    }

    #[test]
    fn output_is_finite_under_random_automation() {
        let mut s = synth();
        let params = s.params();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };

        for _ in 0..400 {
            for _ in 0..4 {
                let id = ParamId::ALL[next() as usize % ParamId::ALL.len()];
                let pos = (next() % 1001) as f32 / 1000.0;
                params.set_normalized(id, pos);
            }
            match next() % 4 {
                0 => s.note_on((next() % 128) as u8, (next() % 128) as f32 / 127.0),
                1 => s.note_off((next() % 128) as u8),
                2 if next() % 20 == 0 => s.all_notes_off(next() % 2 == 0),
                _ => {}
            }

            let n = 1 + next() as usize % BLOCK;
            let mut left = vec![0.0f32; n];
            let mut right = vec![0.0f32; n];
            {
                let mut out: [&mut [f32]; 2] = [&mut left, &mut right];
                s.render(&[], &mut out, n);
            }
            assert!(left.iter().chain(right.iter()).all(|x| x.is_finite()), "non-finite output");
            assert!(s.active_voices() <= 5);
        }
    }

    #[test]
    fn extreme_settings_stay_finite() {
        let params = Arc::new(ParamStore::new());
        for id in [
            ParamId::Osc1FmDepth,
            ParamId::Osc1FmFreq,
            ParamId::Osc2FmDepth,
            ParamId::Osc2FmFreq,
            ParamId::Lfo1Depth,
            ParamId::Lfo1Freq,
            ParamId::FilterAdsrDepth,
            ParamId::FilterResonance,
            ParamId::ReverbSize,
            ParamId::ReverbWet,
            ParamId::ReverbFreeze,
        ] {
            params.set(id, f32::MAX);
        }
        params.set(ParamId::FilterType, 2.0);

        let mut s = SynthProcessor::with_params(EngineConfig::default(), params).unwrap();
        for note in [0u8, 60, 127] {
            s.note_on(note, 1.0);
        }
        for _ in 0..200 {
            let mut left = vec![0.0f32; BLOCK];
            let mut right = vec![0.0f32; BLOCK];
            {
                let mut out: [&mut [f32]; 2] = [&mut left, &mut right];
                s.render(&[], &mut out, BLOCK);
            }
            assert!(left.iter().chain(right.iter()).all(|x| x.is_finite()));
        }
    }

    #[test]
    fn timed_events_start_at_their_offset() {
        let mut s = synth();
        let mut left = vec![0.0f32; BLOCK];
        let mut right = vec![0.0f32; BLOCK];
        {
            let mut out: [&mut [f32]; 2] = [&mut left, &mut right];
            s.process_block(&[], &mut out, BLOCK, &[NoteEvent::note_on(300, 69, 1.0)]);
        }
        assert!(left[..300].iter().all(|&x| x == 0.0), "nothing before the event");
        assert!(left[300..].iter().any(|&x| x != 0.0), "note sounds after the event");
        assert_eq!(s.active_voices(), 1);
    }

    #[test]
    fn note_off_event_inside_block_releases() {
        let mut s = synth();
        s.note_on(69, 1.0);
        let mut left = vec![0.0f32; BLOCK];
        {
            let mut out: [&mut [f32]; 1] = [&mut left];
            s.process_block(&[], &mut out, BLOCK, &[NoteEvent::note_off(128, 69)]);
        }
        assert!(s.voice_pool().voices()[0].is_releasing());
    }

    #[test]
    fn blocks_longer_than_max_are_rendered_in_chunks() {
        let mut s = synth();
        s.note_on(69, 1.0);
        let n = BLOCK * 3 + 17;
        let mut left = vec![0.0f32; n];
        {
            let mut out: [&mut [f32]; 1] = [&mut left];
            s.render(&[], &mut out, n);
        }
        assert!(left[n - 100..].iter().any(|&x| x != 0.0));
    }

    #[test]
    fn input_passes_through_and_extra_channels_are_cleared() {
        let config = EngineConfig { input_channels: 1, ..EngineConfig::default() };
        let mut s = SynthProcessor::new(config).unwrap();

        let input = vec![0.25f32; 64];
        let mut left = vec![9.0f32; 64];
        let mut right = vec![9.0f32; 64];
        {
            let mut out: [&mut [f32]; 2] = [&mut left, &mut right];
            s.render(&[input.as_slice()], &mut out, 64);
        }
        assert!(left.iter().all(|&x| (x - 0.25).abs() < 1e-6));
        assert!(right.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn rejects_unsupported_layouts() {
        let bad = |c: EngineConfig| SynthProcessor::new(c).err();
        assert_eq!(
            bad(EngineConfig { output_channels: 6, ..EngineConfig::default() }),
            Some(LayoutError::UnsupportedOutput(6))
        );
        assert_eq!(
            bad(EngineConfig { output_channels: 1, input_channels: 2, ..EngineConfig::default() }),
            Some(LayoutError::TooManyInputs { inputs: 2, outputs: 1 })
        );
        assert_eq!(
            bad(EngineConfig { max_block_size: 0, ..EngineConfig::default() }),
            Some(LayoutError::ZeroBlockSize)
        );
        assert!(matches!(
            bad(EngineConfig { sample_rate: 0.0, ..EngineConfig::default() }),
            Some(LayoutError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn prepare_silences_and_accepts_new_rate() {
        let mut s = synth();
        s.note_on(60, 1.0);
        render_peak(&mut s, BLOCK);
        s.prepare(48000.0, 256).unwrap();
        assert_eq!(s.active_voices(), 0);
        assert_eq!(s.config().sample_rate, 48000.0);
        assert!(s.prepare(f64::NAN, 256).is_err());
    }

    #[test]
    fn prepare_at_same_rate_clears_reverb_tail() {
        let mut s = synth();
        s.params().set(ParamId::ReverbWet, 1.0);
        s.params().set(ParamId::ReverbSize, 1.0);
        s.note_on(60, 1.0);
        for _ in 0..20 {
            render_peak(&mut s, BLOCK);
        }
        s.prepare(SR, BLOCK).unwrap();
        assert_eq!(render_peak(&mut s, BLOCK), 0.0, "tail should be gone after prepare");
    }

    #[test]
    fn parameter_edits_apply_at_next_block() {
        let mut s = synth();
        s.params().set(ParamId::ReverbDry, 0.0);
        s.note_on(69, 1.0);
        // Dry muted and wet at 0: nothing reaches the output.
        assert_eq!(render_peak(&mut s, BLOCK), 0.0);
        s.params().set(ParamId::ReverbDry, 1.0);
        assert!(render_peak(&mut s, BLOCK) > 0.0);
    }
}
