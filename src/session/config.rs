use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::codec;

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Live model identifier
    pub model: String,

    /// Prebuilt voice used for synthesis
    pub voice: String,

    /// Wire sample rate for captured audio (fixed by the live session)
    pub capture_sample_rate: u32,

    /// Wire sample rate of synthesized audio (fixed by the live session)
    pub playback_sample_rate: u32,

    /// Samples per captured chunk
    pub chunk_samples: usize,

    /// Bound on how long a connect attempt may stay in Connecting
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: "Fenrir".to_string(),
            capture_sample_rate: codec::CAPTURE_SAMPLE_RATE,
            playback_sample_rate: codec::PLAYBACK_SAMPLE_RATE,
            chunk_samples: 4096,
            connect_timeout: Duration::from_secs(10),
        }
    }
}
