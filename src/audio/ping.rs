//! Acknowledgment ping sound
//!
//! Loaded from a WAV file when one is configured, otherwise a short decaying
//! tone is synthesized.

use crate::audio::downmix;
use crate::{ParleyError, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::debug;

const PING_FREQUENCY_HZ: f32 = 880.0;
const PING_DURATION_MS: u32 = 120;

/// Synthesize a sine tone with a linear fade-out
pub fn tone(frequency_hz: f32, duration_ms: u32, sample_rate: u32) -> Vec<f32> {
    let total = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    (0..total)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let envelope = 1.0 - i as f32 / total as f32;
            (t * frequency_hz * 2.0 * std::f32::consts::PI).sin() * 0.4 * envelope
        })
        .collect()
}

/// Mono ping samples at `sample_rate`
pub fn ping_samples(path: Option<&Path>, sample_rate: u32) -> Result<Vec<f32>> {
    match path {
        Some(path) => {
            let (samples, source_rate, channels) = read_wav(path)?;
            let mono = downmix(&samples, channels as usize);
            Ok(resample_nearest(&mono, source_rate, sample_rate))
        }
        None => Ok(tone(PING_FREQUENCY_HZ, PING_DURATION_MS, sample_rate)),
    }
}

/// Read interleaved samples from a WAV file
///
/// Returns (samples, sample_rate, channels).
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32, u16)> {
    let mut reader = WavReader::open(path.as_ref())
        .map_err(|e| ParleyError::IOError(format!("Failed to open WAV file: {}", e)))?;

    let spec = reader.spec();
    debug!(
        "Reading WAV file: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let samples: Result<Vec<f32>> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| ParleyError::IOError(format!("Failed to read sample: {}", e))))
            .collect(),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| {
                s.map(|sample| sample as f32 / i16::MAX as f32)
                    .map_err(|e| ParleyError::IOError(format!("Failed to read sample: {}", e)))
            })
            .collect(),
        (SampleFormat::Int, bits) => {
            let scale = (1u64 << (bits.saturating_sub(1) as u32)) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|sample| sample as f32 / scale)
                        .map_err(|e| ParleyError::IOError(format!("Failed to read sample: {}", e)))
                })
                .collect()
        }
    };

    Ok((samples?, spec.sample_rate, spec.channels))
}

/// Nearest-neighbour rate conversion, good enough for a UI chime
fn resample_nearest(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() || from == 0 {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to as u64 / from as u64) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * from as u64 / to as u64) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}
