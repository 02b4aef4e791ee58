use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::tools::{SaveStrengthHandler, StrengthRecord, ToolMediator};
use crate::audio::capture::{AudioChunk, CaptureBackend, DeviceError};
use crate::audio::codec;
use crate::audio::meter::VolumeMeter;
use crate::audio::playback::{PlaybackConfig, PlaybackScheduler, PlaybackSink};
use crate::error::SessionError;
use crate::live::messages::{AudioPayload, ClientMessage, ServerMessage, SessionSetup};
use crate::live::transport::{ConnectionError, LiveTransport};
use crate::locale::{self, Language};

/// Lifecycle of the single logical session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Produces a fresh capture backend for each connection attempt.
pub type CaptureFactory =
    Box<dyn Fn(&SessionConfig) -> Result<Box<dyn CaptureBackend>, DeviceError> + Send + Sync>;

/// Point-in-time view of the session for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub language: Language,
    /// Volume envelope in [0, 1], max of capture and playback energy
    pub volume: f32,
    pub strengths: Vec<StrengthRecord>,
    /// Localized message of the last surfaced failure, if any
    pub error: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}

/// Orchestration core for one voice conversation.
///
/// Owns the lifecycle state machine, the live connection, the capture
/// pipeline and the playback scheduler. Every asynchronous task spawned for
/// a session captures the epoch that was current when it started and
/// discards itself once the controller has moved on, so a slow callback
/// from a torn-down session can never corrupt a newer one.
pub struct SessionController {
    config: SessionConfig,
    transport: Arc<dyn LiveTransport>,
    capture_factory: CaptureFactory,

    state: Mutex<SessionState>,
    /// Monotonically increasing tag for the current logical session
    epoch: AtomicU64,
    language: Mutex<Language>,

    scheduler: Mutex<PlaybackScheduler>,
    meter: VolumeMeter,
    strengths: Arc<Mutex<Vec<StrengthRecord>>>,
    mediator: ToolMediator,

    capture: tokio::sync::Mutex<Option<Box<dyn CaptureBackend>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,

    last_error: Mutex<Option<String>>,
    connected_at: Mutex<Option<DateTime<Utc>>>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn LiveTransport>,
        capture_factory: CaptureFactory,
        sink: Box<dyn PlaybackSink>,
    ) -> Arc<Self> {
        let strengths = Arc::new(Mutex::new(Vec::new()));
        let mut mediator = ToolMediator::new();
        mediator.register(Box::new(SaveStrengthHandler::new(Arc::clone(&strengths))));

        let playback_config = PlaybackConfig {
            sample_rate: config.playback_sample_rate,
            channels: 1,
        };

        Arc::new(Self {
            config,
            transport,
            capture_factory,
            state: Mutex::new(SessionState::Disconnected),
            epoch: AtomicU64::new(0),
            language: Mutex::new(Language::default()),
            scheduler: Mutex::new(PlaybackScheduler::new(playback_config, sink)),
            meter: VolumeMeter::new(),
            strengths,
            mediator,
            capture: tokio::sync::Mutex::new(None),
            outbound: Mutex::new(None),
            last_error: Mutex::new(None),
            connected_at: Mutex::new(None),
        })
    }

    /// Open a new logical session and start capturing.
    ///
    /// Valid from `Disconnected` and `Error`; a call while a session is
    /// already connecting or connected is a logged no-op.
    pub async fn connect(self: Arc<Self>, language: Language) -> Result<(), SessionError> {
        {
            let state = *self.state.lock().unwrap();
            if matches!(state, SessionState::Connecting | SessionState::Connected) {
                warn!(?state, "connect ignored: session already active");
                return Ok(());
            }
        }

        *self.language.lock().unwrap() = language;
        *self.last_error.lock().unwrap() = None;

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(SessionState::Connecting);
        info!(epoch, ?language, "opening live session");

        let setup = SessionSetup {
            model: self.config.model.clone(),
            response_modalities: vec!["audio".to_string()],
            system_instruction: locale::system_instruction(language).to_string(),
            tools: vec![SaveStrengthHandler::declaration()],
            voice: self.config.voice.clone(),
        };

        let connection = match tokio::time::timeout(
            self.config.connect_timeout,
            self.transport.open(setup),
        )
        .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(self.fail_connection(language, e)),
            Err(_) => return Err(self.fail_connection(language, ConnectionError::Timeout)),
        };

        // Remote session is ready; bring up the capture pipeline.
        let mut backend = match (self.capture_factory)(&self.config) {
            Ok(backend) => backend,
            Err(e) => return Err(self.fail_device(language, e)),
        };
        let chunk_rx = match backend.start().await {
            Ok(rx) => rx,
            Err(e) => return Err(self.fail_device(language, e)),
        };
        info!(backend = backend.name(), "capture pipeline started");

        *self.capture.lock().await = Some(backend);
        *self.outbound.lock().unwrap() = Some(connection.outbound.clone());

        Self::spawn_capture_pump(&self, epoch, chunk_rx, connection.outbound.clone());
        Self::spawn_dispatch(&self, epoch, connection.inbound, connection.outbound);

        if self.epoch.load(Ordering::SeqCst) != epoch {
            // disconnect() won the race during setup; undo our device work.
            self.disconnect().await;
            return Ok(());
        }

        *self.connected_at.lock().unwrap() = Some(Utc::now());
        self.set_state(SessionState::Connected);
        info!(epoch, "live session connected");
        Ok(())
    }

    /// Tear down the current session. Idempotent, callable from any state,
    /// including mid-connect.
    pub async fn disconnect(&self) {
        // Invalidate the epoch before anything else so every in-flight
        // callback from this session becomes a no-op.
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(mut backend) = self.capture.lock().await.take() {
            if let Err(e) = backend.stop().await {
                warn!("capture stop failed: {}", e);
            }
        }

        self.scheduler.lock().unwrap().cancel_all();

        // Dropping the sender ends the writer task and closes the socket.
        self.outbound.lock().unwrap().take();

        self.meter.reset();
        *self.connected_at.lock().unwrap() = None;
        self.set_state(SessionState::Disconnected);
        info!("session disconnected");
    }

    /// Switch the conversation language. An active session is torn down
    /// because the new system instruction requires a fresh one.
    pub async fn set_language(&self, language: Language) {
        *self.language.lock().unwrap() = language;
        let state = self.state();
        if matches!(state, SessionState::Connecting | SessionState::Connected) {
            self.disconnect().await;
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn language(&self) -> Language {
        *self.language.lock().unwrap()
    }

    /// Volume envelope in [0, 1] for the presentation layer.
    pub fn volume(&self) -> f32 {
        self.meter.level()
    }

    pub fn strengths(&self) -> Vec<StrengthRecord> {
        self.strengths.lock().unwrap().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            language: self.language(),
            volume: self.volume(),
            strengths: self.strengths(),
            error: self.last_error(),
            connected_at: *self.connected_at.lock().unwrap(),
        }
    }

    /// Number of playback buffers currently audible or pending.
    pub fn active_playback(&self) -> usize {
        self.scheduler.lock().unwrap().active()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    fn fail_connection(&self, language: Language, e: ConnectionError) -> SessionError {
        error!("live session open failed: {}", e);
        *self.last_error.lock().unwrap() =
            Some(locale::translations(language).error_connection.to_string());
        self.set_state(SessionState::Error);
        SessionError::Connection(e)
    }

    fn fail_device(&self, language: Language, e: DeviceError) -> SessionError {
        error!("capture device failed: {}", e);
        *self.last_error.lock().unwrap() =
            Some(locale::translations(language).error_mic.to_string());
        self.set_state(SessionState::Error);
        SessionError::Device(e)
    }

    /// Forwards captured chunks to the live session without ever blocking
    /// the capture path: the outbound queue is unbounded and drained by the
    /// transport's writer task, so wire order equals production order.
    fn spawn_capture_pump(
        controller: &Arc<Self>,
        epoch: u64,
        mut chunks: mpsc::UnboundedReceiver<AudioChunk>,
        outbound: mpsc::UnboundedSender<ClientMessage>,
    ) {
        let controller = Arc::clone(controller);
        tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                if controller.epoch.load(Ordering::SeqCst) != epoch {
                    break;
                }
                controller.meter.record_capture(&chunk.samples);
                let media = AudioPayload {
                    data: codec::encode_base64(&chunk.samples),
                    sample_rate: chunk.sample_rate,
                    channels: chunk.channels,
                };
                if outbound.send(ClientMessage::Audio { media }).is_err() {
                    warn!("outbound queue closed, stopping capture pump");
                    break;
                }
            }
            debug!(epoch, "capture pump stopped");
        });
    }

    /// Serializes all inbound handling onto one task so playback scheduling
    /// and tool mediation never run concurrently with each other.
    fn spawn_dispatch(
        controller: &Arc<Self>,
        epoch: u64,
        mut inbound: mpsc::Receiver<ServerMessage>,
        outbound: mpsc::UnboundedSender<ClientMessage>,
    ) {
        let controller = Arc::clone(controller);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                if controller.epoch.load(Ordering::SeqCst) != epoch {
                    // Stale epoch: this session was torn down. Not an error.
                    break;
                }
                controller.dispatch(message, &outbound).await;
            }
            debug!(epoch, "inbound dispatch stopped");
        });
    }

    /// Handle one inbound message. Absorbs every per-message failure: a bad
    /// message is logged and skipped, never allowed to take the session down.
    async fn dispatch(&self, message: ServerMessage, outbound: &mpsc::UnboundedSender<ClientMessage>) {
        if let Some(reason) = message.error {
            error!("live session failed: {}", reason);
            let language = self.language();
            *self.last_error.lock().unwrap() =
                Some(locale::translations(language).error_connection.to_string());
            self.set_state(SessionState::Error);
            self.disconnect().await;
            return;
        }

        if !message.tool_calls.is_empty() {
            let language = self.language();
            let responses = self.mediator.handle_batch(&message.tool_calls, language);
            if outbound
                .send(ClientMessage::ToolResponse { responses })
                .is_err()
            {
                warn!("failed to enqueue tool responses, connection closed");
            }
        }

        if let Some(audio) = message.audio {
            match codec::decode_base64(&audio.data, audio.sample_rate, audio.channels) {
                Ok(buffer) => {
                    self.meter.record_playback(&buffer.samples);
                    if let Err(e) = self.scheduler.lock().unwrap().schedule(buffer) {
                        warn!("dropping audio buffer: {}", e);
                    }
                }
                Err(e) => {
                    // Single malformed buffer: dropped, never fatal.
                    warn!("dropping undecodable audio payload: {}", e);
                }
            }
        }

        if message.interrupted {
            info!("barge-in, cancelling scheduled audio");
            self.scheduler.lock().unwrap().cancel_all();
        }

        if message.turn_complete {
            debug!("model turn complete");
        }
    }
}
