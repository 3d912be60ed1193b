//! Loudness metering for UI reactivity
//!
//! The level is advisory: nothing in the pipeline branches on it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Full-scale value used to normalize 16-bit PCM
const PCM16_FULL_SCALE: f32 = 32768.0;

/// Shared, last-writer-wins loudness reading in `[0.0, 1.0]`
///
/// Cloning shares the same underlying value.
#[derive(Clone, Debug, Default)]
pub struct VocalLevel {
    bits: Arc<AtomicU32>,
}

impl VocalLevel {
    /// Create a new level reading at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently published level
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Overwrite the level, clamping into range
    pub fn set(&self, level: f32) {
        let level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Reset to silence
    pub fn reset(&self) {
        self.set(0.0);
    }

    /// Meter 16-bit PCM samples and publish the result
    pub fn publish_pcm16(&self, samples: &[i16]) -> f32 {
        let level = rms_level_i16(samples);
        self.set(level);
        level
    }

    /// Meter f32 samples and publish the result
    pub fn publish_f32(&self, samples: &[f32]) -> f32 {
        let level = rms_level_f32(samples);
        self.set(level);
        level
    }
}

/// Normalized RMS of 16-bit PCM samples
pub fn rms_level_i16(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt() as f32;
    (rms / PCM16_FULL_SCALE).clamp(0.0, 1.0)
}

/// Normalized RMS of f32 samples in `[-1.0, 1.0]`
///
/// Any non-finite sample makes the buffer unreadable and yields 0.0.
pub fn rms_level_f32(samples: &[f32]) -> f32 {
    if samples.is_empty() || samples.iter().any(|s| !s.is_finite()) {
        return 0.0;
    }

    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt() as f32;
    rms.clamp(0.0, 1.0)
}

/// Normalized RMS of raw little-endian 16-bit PCM bytes
///
/// An odd byte count cannot be PCM16 and reads as silence.
pub fn rms_level_pcm16_bytes(raw: &[u8]) -> f32 {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return 0.0;
    }

    let samples: Vec<i16> = raw
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    rms_level_i16(&samples)
}
