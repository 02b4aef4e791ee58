use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// One fixed-size slice of captured audio, the unit of outbound transmission.
///
/// Immutable once produced; consumed exactly once by the transport send path.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1, 1].
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioChunk {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Microphone unavailable or denied. Fatal to the current connection
/// attempt, surfaced to the user; never crashes the process.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio input device available")]
    NoDevice,

    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported audio stream format: {0}")]
    UnsupportedFormat(String),
}

/// Configuration for the capture pipeline.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Wire sample rate the live session expects (fixed)
    pub sample_rate: u32,
    /// Wire channel count (fixed, mono)
    pub channels: u16,
    /// Samples per emitted chunk
    pub chunk_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: super::codec::CAPTURE_SAMPLE_RATE,
            channels: 1,
            chunk_samples: 4096,
        }
    }
}

/// Audio capture backend trait
///
/// The production implementation owns the microphone device via cpal; tests
/// substitute channel-fed fakes. Chunk delivery goes through an unbounded
/// channel so the device callback never blocks on a consumer.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire the device and start capturing.
    ///
    /// Returns the receiver for produced chunks. Chunk order on the channel
    /// equals production order.
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<AudioChunk>, DeviceError>;

    /// Release the device. Safe to call multiple times.
    async fn stop(&mut self) -> Result<(), DeviceError>;

    /// Check if the backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    pub fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, DeviceError> {
        match source {
            CaptureSource::Microphone => {
                Ok(Box::new(super::device::CpalCaptureBackend::new(config)))
            }
        }
    }
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Default microphone input
    Microphone,
}

/// Reframes device-native audio into fixed-size wire chunks.
///
/// Downmixes interleaved input to mono, resamples to the wire rate with a
/// fractional read position carried across calls (so the rate conversion
/// never drifts over a long session), and emits chunks of exactly
/// `chunk_samples` samples in production order.
pub struct ChunkFramer {
    source_rate: u32,
    source_channels: u16,
    target_rate: u32,
    chunk_samples: usize,
    /// Mono source samples not yet consumed by the resampler
    mono: Vec<f32>,
    /// Fractional read position into `mono`
    pos: f64,
    /// Resampled output awaiting chunk emission
    pending: Vec<f32>,
}

impl ChunkFramer {
    pub fn new(
        source_rate: u32,
        source_channels: u16,
        target_rate: u32,
        chunk_samples: usize,
    ) -> Self {
        Self {
            source_rate,
            source_channels,
            target_rate,
            chunk_samples,
            mono: Vec::new(),
            pos: 0.0,
            pending: Vec::new(),
        }
    }

    /// Feed interleaved device samples; returns zero or more complete chunks.
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<AudioChunk> {
        self.downmix(interleaved);

        if self.source_rate == self.target_rate {
            self.pending.append(&mut self.mono);
        } else {
            self.resample();
        }

        let mut chunks = Vec::new();
        while self.pending.len() >= self.chunk_samples {
            let rest = self.pending.split_off(self.chunk_samples);
            let samples = std::mem::replace(&mut self.pending, rest);
            chunks.push(AudioChunk {
                samples,
                sample_rate: self.target_rate,
                channels: 1,
            });
        }
        chunks
    }

    fn downmix(&mut self, interleaved: &[f32]) {
        if self.source_channels <= 1 {
            self.mono.extend_from_slice(interleaved);
            return;
        }
        let channels = self.source_channels as usize;
        for frame in interleaved.chunks_exact(channels) {
            let sum: f32 = frame.iter().sum();
            self.mono.push(sum / channels as f32);
        }
    }

    fn resample(&mut self) {
        let step = self.source_rate as f64 / self.target_rate as f64;

        // Linear interpolation; needs one sample of lookahead, which is why
        // the last source sample stays buffered until the next push.
        while self.pos + 1.0 < self.mono.len() as f64 {
            let index = self.pos as usize;
            let frac = (self.pos - index as f64) as f32;
            let sample = self.mono[index] + (self.mono[index + 1] - self.mono[index]) * frac;
            self.pending.push(sample);
            self.pos += step;
        }

        // pos may overshoot the buffered samples by up to one step; the
        // remainder carries into the next push.
        let consumed = (self.pos as usize).min(self.mono.len());
        if consumed > 0 {
            self.mono.drain(0..consumed);
            self.pos -= consumed as f64;
        }
    }
}
