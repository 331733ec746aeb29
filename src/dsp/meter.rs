//! Lock-free RMS / peak meter.
//!
//! The audio thread stores the latest block measurements as `f32` bits in
//! atomics; readers on any other thread poll them at their own rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
struct MeterValues {
    rms: AtomicU32,
    peak: AtomicU32,
}

/// Writer half, owned by the block renderer.
#[derive(Debug, Default)]
pub struct Meter {
    values: Arc<MeterValues>,
}

/// Cloneable read-only handle for the presentation layer.
#[derive(Debug, Clone)]
pub struct MeterReader {
    values: Arc<MeterValues>,
}

/// A point-in-time copy of both meter values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeterReading {
    pub rms: f32,
    pub peak: f32,
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> MeterReader {
        MeterReader {
            values: Arc::clone(&self.values),
        }
    }

    /// RMS of the block, averaged over channels.
    pub fn process_rms(&self, channels: &[&[f32]]) {
        let rms = if channels.is_empty() {
            0.0
        } else {
            channels.iter().map(|ch| channel_rms(ch)).sum::<f32>() / channels.len() as f32
        };
        self.values.rms.store(rms.to_bits(), Ordering::Relaxed);
    }

    /// Largest absolute sample of the block across all channels.
    pub fn process_peak(&self, channels: &[&[f32]]) {
        let peak = channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        self.values.peak.store(peak.to_bits(), Ordering::Relaxed);
    }

    pub fn rms(&self) -> f32 {
        f32::from_bits(self.values.rms.load(Ordering::Relaxed))
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.values.peak.load(Ordering::Relaxed))
    }
}

impl MeterReader {
    pub fn rms(&self) -> f32 {
        f32::from_bits(self.values.rms.load(Ordering::Relaxed))
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.values.peak.load(Ordering::Relaxed))
    }

    pub fn reading(&self) -> MeterReading {
        MeterReading {
            rms: self.rms(),
            peak: self.peak(),
        }
    }
}

fn channel_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
