//! WAV renderer: bounces a list of timed notes through the full synth
//! pipeline to a WAV byte buffer.

use serde::Deserialize;

use crate::error::RenderError;
use crate::params::ParamStore;
use crate::processor::{EngineConfig, NoteEvent, SynthProcessor};

/// Longest bounce, note timeline plus tail, in seconds.
pub const MAX_RENDER_SECONDS: f64 = 3600.0;

/// One note of an offline render, timed in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TimedNote {
    pub note: u8,
    #[serde(default = "full_velocity")]
    pub velocity: f32,
    pub start: f64,
    pub duration: f64,
}

fn full_velocity() -> f32 {
    1.0
}

/// Render `notes` to interleaved stereo f32, leaving `tail` seconds after the
/// last note-off for releases and reverb to ring out.
///
/// Negative times count as zero. Every note sounds for at least one sample.
pub fn render_notes(
    notes: &[TimedNote],
    params: &ParamStore,
    sample_rate: u32,
    tail: f64,
) -> Result<Vec<f32>, RenderError> {
    let config = EngineConfig {
        sample_rate: sample_rate as f64,
        ..EngineConfig::default()
    };
    let block = config.max_block_size;

    let mut synth = SynthProcessor::new(config)?;
    let shared = synth.params();
    for id in crate::params::ParamId::ALL {
        shared.set(*id, params.get(*id));
    }

    if !tail.is_finite() {
        return Err(RenderError::InvalidTail(tail));
    }
    let mut length = tail.max(0.0);
    for (index, n) in notes.iter().enumerate() {
        if !n.start.is_finite() || !n.duration.is_finite() {
            return Err(RenderError::InvalidNote { index });
        }
        length = length.max(n.start.max(0.0) + n.duration.max(0.0) + tail.max(0.0));
    }
    if length > MAX_RENDER_SECONDS {
        return Err(RenderError::TooLong { seconds: length, limit: MAX_RENDER_SECONDS });
    }

    let sr = sample_rate as f64;
    let to_sample = |seconds: f64| (seconds.max(0.0) * sr).round() as usize;

    // (sample, order, event): note-offs sort before note-ons at the same sample.
    let mut timeline: Vec<(usize, u8, NoteEvent)> = Vec::with_capacity(notes.len() * 2);
    for n in notes {
        let on = to_sample(n.start);
        let off = to_sample(n.start.max(0.0) + n.duration.max(0.0)).max(on + 1);
        timeline.push((on, 1, NoteEvent::note_on(0, n.note, n.velocity)));
        timeline.push((off, 0, NoteEvent::note_off(0, n.note)));
    }
    timeline.sort_by_key(|(at, order, _)| (*at, *order));

    let end = timeline.last().map(|(at, _, _)| *at).unwrap_or(0) + to_sample(tail);
    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];
    let mut out = Vec::with_capacity(end * 2);
    let mut events: Vec<NoteEvent> = Vec::new();
    let mut next = 0;

    let mut pos = 0;
    while pos < end {
        let len = block.min(end - pos);
        events.clear();
        while next < timeline.len() && timeline[next].0 < pos + len {
            let (at, _, mut event) = timeline[next];
            event.offset = at - pos;
            events.push(event);
            next += 1;
        }

        {
            let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
            synth.process_block(&[], &mut channels, len, &events);
        }
        for (l, r) in left[..len].iter().zip(&right[..len]) {
            out.push(*l);
            out.push(*r);
        }
        pos += len;
    }

    Ok(out)
}

/// Render `notes` to a 16-bit stereo PCM WAV file as bytes.
pub fn render_notes_wav(
    notes: &[TimedNote],
    params: &ParamStore,
    sample_rate: u32,
    tail: f64,
) -> Result<Vec<u8>, RenderError> {
    let samples = render_notes(notes, params, sample_rate, tail)?;
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    Ok(encode_wav(&pcm, sample_rate, 2))
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(note: u8, start: f64, duration: f64) -> TimedNote {
        TimedNote { note, velocity: 1.0, start, duration }
    }

    #[test]
    fn wav_header_valid() {
        let params = ParamStore::new();
        let wav = render_notes_wav(&[note(60, 0.0, 0.25)], &params, 44100, 0.1).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 44100);
        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);
    }

    #[test]
    fn wav_size_correct() {
        let params = ParamStore::new();
        // Note ends at 0.5 s, plus 0.5 s tail = 44100 frames.
        let wav = render_notes_wav(&[note(69, 0.0, 0.5)], &params, 44100, 0.5).unwrap();
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 44100 * 2 * 2);
        assert_eq!(wav.len(), 44 + 44100 * 2 * 2);
    }

    #[test]
    fn bounce_is_audible_and_finite() {
        let params = ParamStore::new();
        let melody = [note(60, 0.0, 0.2), note(64, 0.2, 0.2), note(67, 0.4, 0.2), note(72, 0.6, 0.4)];
        let samples = render_notes(&melody, &params, 22050, 0.5).unwrap();
        assert!(samples.iter().all(|s| s.is_finite()));
        assert!(samples.iter().any(|s| s.abs() > 0.01), "bounce should not be silent");
    }

    #[test]
    fn notes_start_at_their_time() {
        let params = ParamStore::new();
        let samples = render_notes(&[note(69, 0.5, 0.2)], &params, 44100, 0.0).unwrap();
        let first_frame = 22050 * 2;
        assert!(samples[..first_frame].iter().all(|&s| s == 0.0), "silence before the note");
        assert!(samples[first_frame..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn timed_notes_deserialize_with_default_velocity() {
        let notes: Vec<TimedNote> =
            serde_json::from_str(r#"[{"note": 60, "start": 0.0, "duration": 1.0}]"#).unwrap();
        assert_eq!(notes[0].velocity, 1.0);
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let params = ParamStore::new();
        assert!(matches!(
            render_notes(&[note(60, 0.0, 0.1)], &params, 0, 0.0),
            Err(RenderError::Layout(_))
        ));
    }

    #[test]
    fn rejects_unrepresentable_timing() {
        let params = ParamStore::new();
        assert!(matches!(
            render_notes(&[note(60, 1e30, 1.0)], &params, 44100, 0.0),
            Err(RenderError::TooLong { .. })
        ));
        assert!(matches!(
            render_notes(&[note(60, 0.0, 0.1), note(62, f64::NAN, 1.0)], &params, 44100, 0.0),
            Err(RenderError::InvalidNote { index: 1 })
        ));
        assert!(matches!(
            render_notes(&[note(60, 0.0, f64::INFINITY)], &params, 44100, 0.0),
            Err(RenderError::InvalidNote { index: 0 })
        ));
        assert!(matches!(
            render_notes(&[note(60, 0.0, 0.1)], &params, 44100, f64::INFINITY),
            Err(RenderError::InvalidTail(_))
        ));
    }

    #[test]
    fn zero_length_note_is_released() {
        let params = ParamStore::new();
        let samples = render_notes(&[note(69, 0.0, 0.0)], &params, 44100, 2.0).unwrap();
        let last = &samples[samples.len() - 2000..];
        assert!(last.iter().all(|&s| s == 0.0), "zero-length note should have died out");
    }

    #[test]
    fn back_to_back_repeats_retrigger() {
        let params = ParamStore::new();
        // Second note starts on the sample the first one ends.
        let samples =
            render_notes(&[note(69, 0.0, 0.25), note(69, 0.25, 0.25)], &params, 44100, 1.0).unwrap();
        let last = &samples[samples.len() - 2000..];
        assert!(last.iter().all(|&s| s == 0.0), "both notes should be released");
    }
}
