pub mod capture;
pub mod codec;
pub mod device;
pub mod meter;
pub mod playback;

pub use capture::{
    AudioChunk, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureSource, ChunkFramer,
    DeviceError,
};
pub use codec::{CodecError, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};
pub use device::{CpalCaptureBackend, CpalPlaybackSink};
pub use meter::VolumeMeter;
pub use playback::{HandleId, PlaybackBuffer, PlaybackConfig, PlaybackScheduler, PlaybackSink};
