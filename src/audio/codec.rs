//! Wire audio codec: f32 samples ↔ base64-wrapped little-endian PCM16.
//!
//! Pure functions, no state. Encoding clamps out-of-range input instead of
//! failing; decoding rejects malformed payloads with [`CodecError`], which
//! callers treat as a single dropped buffer, never a session failure.

use base64::Engine;
use thiserror::Error;

use super::playback::PlaybackBuffer;

/// Sample rate the live session expects on the capture path.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio arriving from the live session.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Malformed inbound audio payload. Non-fatal: the buffer is dropped.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("odd PCM16 byte count: {0}")]
    OddLength(usize),

    #[error("empty audio payload")]
    Empty,

    #[error("unexpected audio format: {got_rate} Hz / {got_channels} ch, expected {want_rate} Hz / {want_channels} ch")]
    Format {
        got_rate: u32,
        got_channels: u16,
        want_rate: u32,
        want_channels: u16,
    },
}

/// Quantize f32 samples in [-1, 1] to little-endian PCM16 bytes.
///
/// Out-of-range samples are clamped, not rejected.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let quantized = (sample * 32_768.0)
            .clamp(i16::MIN as f32, i16::MAX as f32)
            .round() as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    bytes
}

/// Encode f32 samples to the base64 wire representation.
pub fn encode_base64(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(encode_samples(samples))
}

/// Decode little-endian PCM16 bytes into a playback buffer.
pub fn decode_samples(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<PlaybackBuffer, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.len()));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect();

    Ok(PlaybackBuffer {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode a base64 wire payload into a playback buffer.
pub fn decode_base64(
    data: &str,
    sample_rate: u32,
    channels: u16,
) -> Result<PlaybackBuffer, CodecError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
    decode_samples(&bytes, sample_rate, channels)
}
