//! Voice pool: fixed set of voices with allocation and stealing.
//!
//! Voices are created once; note-on only selects an index, so the audio
//! thread never grows or shrinks the pool.

use super::voice::{Voice, VoiceParams};

/// Number of voices the reference instrument ships with.
pub const DEFAULT_VOICES: usize = 5;

pub struct VoicePool {
    voices: Vec<Voice>,
    params: VoiceParams,
    /// Mono mix bus the voices add into before fan-out to the channels.
    scratch: Vec<f64>,
    next_stamp: u64,
}

impl VoicePool {
    pub fn new(num_voices: usize, sample_rate: f64, max_block_size: usize) -> Self {
        let num_voices = num_voices.max(1);
        VoicePool {
            voices: (0..num_voices).map(|_| Voice::new(sample_rate)).collect(),
            params: VoiceParams::default(),
            scratch: vec![0.0; max_block_size.max(1)],
            next_stamp: 0,
        }
    }

    /// Reconfigure for a new sample rate / block size. Not real-time safe.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        for voice in &mut self.voices {
            voice.stop_note(false);
            voice.set_sample_rate(sample_rate);
        }
        self.scratch = vec![0.0; max_block_size.max(1)];
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn max_block_size(&self) -> usize {
        self.scratch.len()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Push the per-block parameter snapshot into every voice.
    pub fn apply_params(&mut self, params: &VoiceParams) {
        self.params = *params;
        for voice in &mut self.voices {
            voice.apply_params(params);
        }
    }

    /// Start a note on an idle voice, or steal one. Returns the voice index.
    pub fn note_on(&mut self, note: u8, velocity: f64) -> usize {
        // A key struck again while still held releases its previous voice.
        for voice in &mut self.voices {
            if voice.is_key_down() && voice.note() == note {
                voice.stop_note(true);
            }
        }

        let index = self.select_voice();
        let voice = &mut self.voices[index];
        if voice.is_active() {
            voice.stop_note(false);
        }
        self.next_stamp += 1;
        voice.start_note(note, velocity, &self.params, self.next_stamp);
        index
    }

    /// Release every held voice playing `note`. Unknown notes are ignored.
    pub fn note_off(&mut self, note: u8) {
        for voice in &mut self.voices {
            if voice.is_key_down() && voice.note() == note {
                voice.stop_note(true);
            }
        }
    }

    pub fn all_notes_off(&mut self, hard: bool) {
        for voice in &mut self.voices {
            if hard {
                voice.stop_note(false);
            } else if voice.is_active() {
                voice.stop_note(true);
            }
        }
    }

    /// Idle voice first, then the quietest releasing voice, then the oldest.
    fn select_voice(&self) -> usize {
        if let Some(i) = self.voices.iter().position(|v| !v.is_active()) {
            return i;
        }

        let quietest_release = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_releasing())
            .min_by(|(_, a), (_, b)| a.amp_level().total_cmp(&b.amp_level()))
            .map(|(i, _)| i);
        if let Some(i) = quietest_release {
            return i;
        }

        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.started_at())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Render all voices and add the result to every channel at
    /// `start..start + num_samples`. `num_samples` must not exceed
    /// [`VoicePool::max_block_size`].
    pub fn render_next_block(&mut self, output: &mut [&mut [f32]], start: usize, num_samples: usize) {
        let num_samples = num_samples.min(self.scratch.len());
        let mix = &mut self.scratch[..num_samples];
        mix.fill(0.0);

        for voice in &mut self.voices {
            voice.render_next_block(mix);
        }

        for channel in output.iter_mut() {
            let end = (start + num_samples).min(channel.len());
            if start >= end {
                continue;
            }
            for (out, &s) in channel[start..end].iter_mut().zip(mix.iter()) {
                *out += s as f32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> VoicePool {
        VoicePool::new(DEFAULT_VOICES, 44100.0, 512)
    }

    fn render(pool: &mut VoicePool, n: usize) {
        let mut left = vec![0.0f32; n];
        let mut channels: [&mut [f32]; 1] = [&mut left];
        pool.render_next_block(&mut channels, 0, n);
    }

    #[test]
    fn uses_idle_voices_first() {
        let mut p = pool();
        let picked: Vec<usize> = (60..65).map(|n| p.note_on(n, 1.0)).collect();
        assert_eq!(picked, vec![0, 1, 2, 3, 4]);
        assert_eq!(p.active_count(), 5);
    }

    #[test]
    fn steals_oldest_when_all_held() {
        let mut p = pool();
        for n in 60..65 {
            p.note_on(n, 1.0);
            render(&mut p, 64);
        }
        let index = p.note_on(72, 1.0);
        assert_eq!(index, 0, "first-triggered voice should be stolen");
        assert_eq!(p.active_count(), 5);
        let notes: Vec<u8> = p.voices().iter().map(|v| v.note()).collect();
        assert_eq!(notes, vec![72, 61, 62, 63, 64]);
    }

    #[test]
    fn prefers_quietest_releasing_voice() {
        let mut p = pool();
        let mut params = VoiceParams::default();
        params.amp.attack = 0.001;
        params.amp.release = 1.0;
        p.apply_params(&params);

        for n in 60..65 {
            p.note_on(n, 1.0);
        }
        render(&mut p, 512);
        p.note_off(62);
        render(&mut p, 512);
        p.note_off(63);
        render(&mut p, 128);

        // 62 has been releasing longer, so it is quieter.
        let index = p.note_on(80, 1.0);
        assert_eq!(index, 2);
        assert_eq!(p.active_count(), 5);
    }

    #[test]
    fn note_off_without_match_is_noop() {
        let mut p = pool();
        p.note_on(60, 1.0);
        render(&mut p, 64);
        let before: Vec<(bool, bool, f64)> = p
            .voices()
            .iter()
            .map(|v| (v.is_active(), v.is_key_down(), v.amp_level()))
            .collect();
        p.note_off(99);
        let after: Vec<(bool, bool, f64)> = p
            .voices()
            .iter()
            .map(|v| (v.is_active(), v.is_key_down(), v.amp_level()))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn repeated_note_on_releases_previous_voice() {
        let mut p = pool();
        let first = p.note_on(60, 1.0);
        render(&mut p, 256);
        let second = p.note_on(60, 1.0);
        assert_ne!(first, second);
        assert!(p.voices()[first].is_releasing());
        assert!(p.voices()[second].is_key_down());
    }

    #[test]
    fn never_more_than_capacity_active() {
        let mut p = pool();
        for i in 0..200u32 {
            p.note_on((i % 40 + 30) as u8, 0.5);
            if i % 3 == 0 {
                p.note_off(((i + 7) % 40 + 30) as u8);
            }
            render(&mut p, 37);
            assert!(p.active_count() <= p.capacity());
        }
    }

    #[test]
    fn all_notes_off_hard_silences_everything() {
        let mut p = pool();
        for n in 60..63 {
            p.note_on(n, 1.0);
        }
        p.all_notes_off(true);
        assert_eq!(p.active_count(), 0);
    }

    #[test]
    fn all_notes_off_soft_releases() {
        let mut p = pool();
        for n in 60..63 {
            p.note_on(n, 1.0);
        }
        render(&mut p, 256);
        p.all_notes_off(false);
        assert_eq!(p.active_count(), 3);
        assert!(p.voices().iter().filter(|v| v.is_active()).all(|v| v.is_releasing()));
    }

    #[test]
    fn mixes_additively_into_every_channel() {
        let mut p = pool();
        p.note_on(69, 1.0);
        let mut left = vec![1.0f32; 256];
        let mut right = vec![0.0f32; 256];
        {
            let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
            p.render_next_block(&mut channels, 0, 256);
        }
        for (l, r) in left.iter().zip(right.iter()) {
            assert!((l - 1.0 - r).abs() < 1e-6, "channels should carry the same voice mix");
        }
        assert!(right.iter().any(|s| s.abs() > 0.0));
    }
}
