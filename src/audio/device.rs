//! cpal-backed microphone capture and speaker playback.
//!
//! cpal streams are not `Send`, so each backend parks a dedicated thread
//! that owns its stream; everything crossing the thread boundary is channels
//! and atomics. Device callbacks never block: capture chunks leave through
//! an unbounded channel, playback mixes from a shared segment list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::capture::{AudioChunk, CaptureBackend, CaptureConfig, ChunkFramer, DeviceError};
use super::playback::{HandleId, PlaybackBuffer, PlaybackSink};

// ============================================================================
// Capture
// ============================================================================

/// Microphone capture backend over the default cpal input device.
pub struct CpalCaptureBackend {
    config: CaptureConfig,
    capturing: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalCaptureBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

#[async_trait]
impl CaptureBackend for CpalCaptureBackend {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<AudioChunk>, DeviceError> {
        if self.thread.is_some() {
            return Err(DeviceError::Unavailable("capture already started".into()));
        }

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let capturing = Arc::clone(&self.capturing);
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("astra-capture".to_string())
            .spawn(move || {
                let stream = match open_input_stream(&config, chunk_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::Unavailable(e.to_string())));
                    return;
                }

                capturing.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));

                while !stop.load(Ordering::SeqCst) {
                    std::thread::park_timeout(Duration::from_millis(100));
                }

                // Dropping the stream releases the device.
                drop(stream);
                capturing.store(false, Ordering::SeqCst);
            })
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        self.thread = Some(thread);

        match ready_rx.await {
            Ok(Ok(())) => Ok(chunk_rx),
            Ok(Err(e)) => {
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
                Err(e)
            }
            Err(_) => {
                self.thread.take();
                Err(DeviceError::Unavailable("capture thread exited".into()))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                warn!("capture thread panicked during stop");
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

impl Drop for CpalCaptureBackend {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

fn open_input_stream(
    config: &CaptureConfig,
    chunks: mpsc::UnboundedSender<AudioChunk>,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(DeviceError::NoDevice)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.config();

    info!(
        device = %device_name,
        source_rate = stream_config.sample_rate.0,
        source_channels = stream_config.channels,
        target_rate = config.sample_rate,
        "opening capture device"
    );

    let mut framer = ChunkFramer::new(
        stream_config.sample_rate.0,
        stream_config.channels,
        config.sample_rate,
        config.chunk_samples,
    );
    let err_fn = |err| error!("capture stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for chunk in framer.push(data) {
                        if chunks.send(chunk).is_err() {
                            return;
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?,
        SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / 32_768.0).collect();
                    for chunk in framer.push(&floats) {
                        if chunks.send(chunk).is_err() {
                            return;
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?,
        other => {
            return Err(DeviceError::UnsupportedFormat(format!("{:?}", other)));
        }
    };

    Ok(stream)
}

// ============================================================================
// Playback
// ============================================================================

struct Segment {
    handle: HandleId,
    start_frame: u64,
    samples: Vec<f32>,
    cursor: usize,
}

#[derive(Default)]
struct SinkShared {
    segments: Vec<Segment>,
    finished: Vec<HandleId>,
    frames_elapsed: u64,
}

/// Speaker playback sink over the default cpal output device.
///
/// The output callback mixes every segment whose start frame has been
/// reached; the frame counter it advances is the device clock the
/// scheduler reads through `now()`.
pub struct CpalPlaybackSink {
    device_rate: u32,
    shared: Arc<Mutex<SinkShared>>,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalPlaybackSink {
    /// Acquire the default output device and start the output stream.
    pub fn open() -> Result<Self, DeviceError> {
        let shared = Arc::new(Mutex::new(SinkShared::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread_shared = Arc::clone(&shared);
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("astra-playback".to_string())
            .spawn(move || {
                let (stream, rate) = match open_output_stream(thread_shared) {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::Unavailable(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(rate));

                while !thread_stop.load(Ordering::SeqCst) {
                    std::thread::park_timeout(Duration::from_millis(100));
                }
                drop(stream);
            })
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        let device_rate = ready_rx
            .recv()
            .map_err(|_| DeviceError::Unavailable("playback thread exited".into()))??;

        Ok(Self {
            device_rate,
            shared,
            stop,
            thread: Some(thread),
        })
    }
}

impl PlaybackSink for CpalPlaybackSink {
    fn now(&self) -> f64 {
        let shared = self.shared.lock().unwrap();
        shared.frames_elapsed as f64 / self.device_rate as f64
    }

    fn begin(&mut self, handle: HandleId, start_secs: f64, buffer: &PlaybackBuffer) {
        let mono = downmix(&buffer.samples, buffer.channels);
        let samples = resample_linear(&mono, buffer.sample_rate, self.device_rate);
        let start_frame = (start_secs * self.device_rate as f64).round() as u64;

        let mut shared = self.shared.lock().unwrap();
        shared.segments.push(Segment {
            handle,
            start_frame,
            samples,
            cursor: 0,
        });
    }

    fn halt(&mut self, handle: HandleId) {
        let mut shared = self.shared.lock().unwrap();
        shared.segments.retain(|segment| segment.handle != handle);
    }

    fn finished(&mut self) -> Vec<HandleId> {
        let mut shared = self.shared.lock().unwrap();
        std::mem::take(&mut shared.finished)
    }
}

impl Drop for CpalPlaybackSink {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

fn open_output_stream(
    shared: Arc<Mutex<SinkShared>>,
) -> Result<(cpal::Stream, u32), DeviceError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.config();
    let rate = stream_config.sample_rate.0;
    let channels = stream_config.channels as usize;

    info!(
        device = %device_name,
        rate,
        channels,
        "opening playback device"
    );

    let err_fn = |err| error!("playback stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut shared = shared.lock().unwrap();
                    mix_into(&mut *shared, data, channels, |value| value);
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?,
        SampleFormat::I16 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut shared = shared.lock().unwrap();
                    mix_into(&mut *shared, data, channels, |value| {
                        (value * 32_767.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
                    });
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?,
        other => {
            return Err(DeviceError::UnsupportedFormat(format!("{:?}", other)));
        }
    };

    Ok((stream, rate))
}

fn mix_into<T: Copy>(
    shared: &mut SinkShared,
    data: &mut [T],
    channels: usize,
    convert: impl Fn(f32) -> T,
) {
    let frames = data.len() / channels.max(1);
    let base = shared.frames_elapsed;

    for frame_index in 0..frames {
        let t = base + frame_index as u64;
        let mut value = 0.0f32;
        for segment in shared.segments.iter_mut() {
            if t >= segment.start_frame && segment.cursor < segment.samples.len() {
                value += segment.samples[segment.cursor];
                segment.cursor += 1;
            }
        }
        let sample = convert(value.clamp(-1.0, 1.0));
        for channel in 0..channels {
            data[frame_index * channels + channel] = sample;
        }
    }

    shared.frames_elapsed += frames as u64;

    let mut done = Vec::new();
    shared.segments.retain(|segment| {
        if segment.cursor >= segment.samples.len() {
            done.push(segment.handle);
            false
        } else {
            true
        }
    });
    shared.finished.extend(done);
}

fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let index = pos as usize;
            let frac = (pos - index as f64) as f32;
            if index + 1 < samples.len() {
                samples[index] + (samples[index + 1] - samples[index]) * frac
            } else {
                samples[samples.len() - 1]
            }
        })
        .collect()
}
