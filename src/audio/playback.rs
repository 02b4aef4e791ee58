//! Gapless playback scheduling for synthesized audio.
//!
//! The scheduler lays buffers end to end on a monotonic cursor and keeps a
//! generation-counter arena of everything that is started but not yet
//! finished, so an interruption can silence all of it at once. The actual
//! output device sits behind [`PlaybackSink`].

use std::collections::HashMap;

use tracing::debug;

use super::codec::CodecError;

/// One unit of decoded inbound audio ready for scheduling.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    /// f32 samples in [-1, 1], interleaved if multi-channel
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl PlaybackBuffer {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Identifier of one scheduled buffer; generations are never reused within
/// a scheduler instance.
pub type HandleId = u64;

/// Output device seam for the scheduler.
///
/// `now` is the device clock in seconds; `begin` starts a buffer at an
/// absolute clock time; `halt` silences one handle immediately; `finished`
/// drains the handles that completed naturally since the last call.
pub trait PlaybackSink: Send {
    fn now(&self) -> f64;
    fn begin(&mut self, handle: HandleId, start_secs: f64, buffer: &PlaybackBuffer);
    fn halt(&mut self, handle: HandleId);
    fn finished(&mut self) -> Vec<HandleId>;
}

/// Output format the live session produces (fixed).
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: super::codec::PLAYBACK_SAMPLE_RATE,
            channels: 1,
        }
    }
}

struct Scheduled {
    start_secs: f64,
    duration_secs: f64,
}

/// Schedules decoded buffers for contiguous playback and supports
/// immediate full cancellation.
pub struct PlaybackScheduler {
    config: PlaybackConfig,
    sink: Box<dyn PlaybackSink>,
    /// Earliest time the next buffer may start; never moves backwards
    /// except on `cancel_all`, and never sits below the device clock.
    cursor: f64,
    next_handle: HandleId,
    scheduled: HashMap<HandleId, Scheduled>,
}

impl PlaybackScheduler {
    pub fn new(config: PlaybackConfig, sink: Box<dyn PlaybackSink>) -> Self {
        let cursor = sink.now();
        Self {
            config,
            sink,
            cursor,
            next_handle: 0,
            scheduled: HashMap::new(),
        }
    }

    /// Schedule a buffer to start at `max(cursor, now)` and advance the
    /// cursor by its duration, so consecutive buffers play back to back
    /// with no gap and no overlap.
    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<HandleId, CodecError> {
        if buffer.sample_rate != self.config.sample_rate
            || buffer.channels != self.config.channels
        {
            return Err(CodecError::Format {
                got_rate: buffer.sample_rate,
                got_channels: buffer.channels,
                want_rate: self.config.sample_rate,
                want_channels: self.config.channels,
            });
        }

        self.reap();

        let start = self.cursor.max(self.sink.now());
        let handle = self.next_handle;
        self.next_handle += 1;

        self.sink.begin(handle, start, &buffer);
        self.scheduled.insert(
            handle,
            Scheduled {
                start_secs: start,
                duration_secs: buffer.duration_secs(),
            },
        );
        self.cursor = start + buffer.duration_secs();

        debug!(
            handle,
            start_secs = start,
            duration_secs = buffer.duration_secs(),
            "scheduled playback buffer"
        );
        Ok(handle)
    }

    /// Silence every playing or pending buffer and reset the cursor to the
    /// device clock. This is the barge-in response.
    pub fn cancel_all(&mut self) {
        for handle in self.scheduled.keys().copied().collect::<Vec<_>>() {
            self.sink.halt(handle);
        }
        if !self.scheduled.is_empty() {
            debug!(cancelled = self.scheduled.len(), "cancelled scheduled audio");
        }
        self.scheduled.clear();
        self.cursor = self.sink.now();
    }

    /// Number of buffers started but not yet finished or cancelled.
    pub fn active(&mut self) -> usize {
        self.reap();
        self.scheduled.len()
    }

    /// Earliest time the next buffer may start.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Scheduled start time of a handle, while it is still live.
    pub fn start_of(&self, handle: HandleId) -> Option<f64> {
        self.scheduled.get(&handle).map(|s| s.start_secs)
    }

    fn reap(&mut self) {
        for handle in self.sink.finished() {
            if let Some(done) = self.scheduled.remove(&handle) {
                debug!(
                    handle,
                    duration_secs = done.duration_secs,
                    "playback buffer finished"
                );
            }
        }
    }
}
