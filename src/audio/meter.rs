use std::sync::atomic::{AtomicU32, Ordering};

/// Volume envelope tap for the presentation layer.
///
/// Capture and playback paths each record the RMS level of the signal they
/// last handled; `level()` is the max of the two, normalized to [0, 1].
#[derive(Debug, Default)]
pub struct VolumeMeter {
    capture_bits: AtomicU32,
    playback_bits: AtomicU32,
}

impl VolumeMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_capture(&self, samples: &[f32]) {
        self.capture_bits.store(rms(samples).to_bits(), Ordering::Relaxed);
    }

    pub fn record_playback(&self, samples: &[f32]) {
        self.playback_bits.store(rms(samples).to_bits(), Ordering::Relaxed);
    }

    /// Current envelope value in [0, 1].
    pub fn level(&self) -> f32 {
        let capture = f32::from_bits(self.capture_bits.load(Ordering::Relaxed));
        let playback = f32::from_bits(self.playback_bits.load(Ordering::Relaxed));
        capture.max(playback).clamp(0.0, 1.0)
    }

    pub fn reset(&self) {
        self.capture_bits.store(0, Ordering::Relaxed);
        self.playback_bits.store(0, Ordering::Relaxed);
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
