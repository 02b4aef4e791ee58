// Integration tests for the session controller: lifecycle, epoch
// discipline, FIFO chunk transmission, tool round-trips and barge-in.
//
// The live session, microphone and speaker are all substituted with
// channel-backed fakes so the orchestration core runs deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use astra_voice::audio::codec;
use astra_voice::audio::{
    AudioChunk, CaptureBackend, DeviceError, HandleId, PlaybackBuffer, PlaybackSink,
};
use astra_voice::live::{
    AudioPayload, ClientMessage, ConnectionError, LiveConnection, LiveTransport, ServerMessage,
    SessionSetup, ToolCallMessage,
};
use astra_voice::locale::Language;
use astra_voice::session::{CaptureFactory, SessionConfig, SessionController, SessionState};
use astra_voice::SessionError;

// ============================================================================
// Test doubles
// ============================================================================

struct ServerSide {
    to_client: mpsc::Sender<ServerMessage>,
    from_client: mpsc::UnboundedReceiver<ClientMessage>,
}

#[derive(Clone, Default)]
struct MockTransport {
    sides: Arc<Mutex<Vec<Option<ServerSide>>>>,
}

impl MockTransport {
    fn take_side(&self, index: usize) -> ServerSide {
        self.sides.lock().unwrap()[index]
            .take()
            .expect("server side already taken")
    }

    fn open_count(&self) -> usize {
        self.sides.lock().unwrap().len()
    }
}

#[async_trait]
impl LiveTransport for MockTransport {
    async fn open(&self, _setup: SessionSetup) -> Result<LiveConnection, ConnectionError> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(64);
        self.sides.lock().unwrap().push(Some(ServerSide {
            to_client: in_tx,
            from_client: out_rx,
        }));
        Ok(LiveConnection::new(out_tx, in_rx))
    }
}

struct HangingTransport;

#[async_trait]
impl LiveTransport for HangingTransport {
    async fn open(&self, _setup: SessionSetup) -> Result<LiveConnection, ConnectionError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("open never completes");
    }
}

struct FakeCapture {
    chunk_tx: Arc<Mutex<Option<mpsc::UnboundedSender<AudioChunk>>>>,
    capturing: Arc<AtomicBool>,
}

#[async_trait]
impl CaptureBackend for FakeCapture {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<AudioChunk>, DeviceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.chunk_tx.lock().unwrap() = Some(tx);
        self.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        self.capturing.store(false, Ordering::SeqCst);
        self.chunk_tx.lock().unwrap().take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "fake-microphone"
    }
}

#[derive(Default)]
struct SinkState {
    now: f64,
    halted: Vec<HandleId>,
    finished: Vec<HandleId>,
}

#[derive(Clone, Default)]
struct TestSink(Arc<Mutex<SinkState>>);

impl PlaybackSink for TestSink {
    fn now(&self) -> f64 {
        self.0.lock().unwrap().now
    }

    fn begin(&mut self, _handle: HandleId, _start_secs: f64, _buffer: &PlaybackBuffer) {}

    fn halt(&mut self, handle: HandleId) {
        self.0.lock().unwrap().halted.push(handle);
    }

    fn finished(&mut self) -> Vec<HandleId> {
        std::mem::take(&mut self.0.lock().unwrap().finished)
    }
}

struct Harness {
    controller: Arc<SessionController>,
    transport: MockTransport,
    mic_tx: Arc<Mutex<Option<mpsc::UnboundedSender<AudioChunk>>>>,
    mic_on: Arc<AtomicBool>,
    sink: TestSink,
}

fn harness() -> Harness {
    let transport = MockTransport::default();
    let mic_tx: Arc<Mutex<Option<mpsc::UnboundedSender<AudioChunk>>>> =
        Arc::new(Mutex::new(None));
    let mic_on = Arc::new(AtomicBool::new(false));
    let sink = TestSink::default();

    let factory_tx = Arc::clone(&mic_tx);
    let factory_on = Arc::clone(&mic_on);
    let capture_factory: CaptureFactory = Box::new(move |_cfg| {
        Ok(Box::new(FakeCapture {
            chunk_tx: Arc::clone(&factory_tx),
            capturing: Arc::clone(&factory_on),
        }))
    });

    let config = SessionConfig {
        connect_timeout: Duration::from_millis(250),
        ..Default::default()
    };

    let controller = SessionController::new(
        config,
        Arc::new(transport.clone()),
        capture_factory,
        Box::new(sink.clone()),
    );

    Harness {
        controller,
        transport,
        mic_tx,
        mic_on,
        sink,
    }
}

fn chunk_of(level: f32) -> AudioChunk {
    AudioChunk {
        samples: vec![level; 4096],
        sample_rate: 16000,
        channels: 1,
    }
}

fn audio_message(duration_secs: f64) -> ServerMessage {
    let samples = vec![0.2f32; (duration_secs * 24000.0) as usize];
    ServerMessage {
        audio: Some(AudioPayload {
            data: codec::encode_base64(&samples),
            sample_rate: 24000,
            channels: 1,
        }),
        ..Default::default()
    }
}

fn save_strength_message(id: &str, title: &str) -> ServerMessage {
    ServerMessage {
        tool_calls: vec![ToolCallMessage {
            id: id.to_string(),
            name: "save_strength".to_string(),
            args: serde_json::json!({
                "title": title,
                "description": "Visible in how they tell the story."
            }),
        }],
        ..Default::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

async fn recv_client(side: &mut ServerSide) -> ClientMessage {
    tokio::time::timeout(Duration::from_secs(2), side.from_client.recv())
        .await
        .expect("timed out waiting for client message")
        .expect("client closed the connection")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connect_starts_capture_and_sends_chunks_in_order() {
    let h = harness();

    h.controller.clone().connect(Language::En).await.unwrap();
    assert_eq!(h.controller.state(), SessionState::Connected);
    assert!(h.mic_on.load(Ordering::SeqCst), "mic starts once session is ready");

    let mut side = h.transport.take_side(0);
    let mic = h.mic_tx.lock().unwrap().clone().unwrap();

    // Three chunks of 4096 samples; the second send being slow on the wire
    // cannot reorder them because the outbound queue is FIFO.
    for i in 0..3 {
        mic.send(chunk_of((i as f32 + 1.0) * 0.1)).unwrap();
    }

    for i in 0..3 {
        match recv_client(&mut side).await {
            ClientMessage::Audio { media } => {
                assert_eq!(media.sample_rate, 16000);
                assert_eq!(media.channels, 1);
                let buffer = codec::decode_base64(&media.data, 16000, 1).unwrap();
                assert_eq!(buffer.samples.len(), 4096);
                let expected = (i as f32 + 1.0) * 0.1;
                assert!(
                    (buffer.samples[0] - expected).abs() < 1e-3,
                    "chunk {} out of order",
                    i
                );
            }
            other => panic!("expected audio message, got {:?}", other),
        }
    }

    wait_until(|| h.controller.volume() > 0.0).await;
}

#[tokio::test]
async fn test_tool_call_roundtrip_records_strength() {
    let h = harness();
    h.controller.clone().connect(Language::En).await.unwrap();
    let mut side = h.transport.take_side(0);

    side.to_client
        .send(save_strength_message("fc-42", "Analytical Logic"))
        .await
        .unwrap();

    let controller = Arc::clone(&h.controller);
    wait_until(move || controller.strengths().len() == 1).await;

    let strengths = h.controller.strengths();
    assert_eq!(strengths[0].title, "Analytical Logic");
    assert!(!strengths[0].id.is_empty());

    match recv_client(&mut side).await {
        ClientMessage::ToolResponse { responses } => {
            assert_eq!(responses.len(), 1);
            assert_eq!(responses[0].id, "fc-42");
            assert_eq!(responses[0].result["result"], "Strength recorded successfully.");
        }
        other => panic!("expected tool response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_interruption_silences_all_scheduled_audio() {
    let h = harness();
    h.controller.clone().connect(Language::En).await.unwrap();
    let side = h.transport.take_side(0);

    side.to_client.send(audio_message(0.5)).await.unwrap();
    side.to_client.send(audio_message(0.3)).await.unwrap();

    let controller = Arc::clone(&h.controller);
    wait_until(move || controller.active_playback() == 2).await;

    side.to_client
        .send(ServerMessage {
            interrupted: true,
            ..Default::default()
        })
        .await
        .unwrap();

    let controller = Arc::clone(&h.controller);
    wait_until(move || controller.active_playback() == 0).await;
    assert_eq!(h.sink.0.lock().unwrap().halted.len(), 2);
}

#[tokio::test]
async fn test_malformed_audio_is_dropped_without_teardown() {
    let h = harness();
    h.controller.clone().connect(Language::En).await.unwrap();
    let side = h.transport.take_side(0);

    side.to_client
        .send(ServerMessage {
            audio: Some(AudioPayload {
                data: "@@not-base64@@".to_string(),
                sample_rate: 24000,
                channels: 1,
            }),
            ..Default::default()
        })
        .await
        .unwrap();

    // A good buffer right after still schedules: the codec error was absorbed.
    side.to_client.send(audio_message(0.1)).await.unwrap();

    let controller = Arc::clone(&h.controller);
    wait_until(move || controller.active_playback() == 1).await;
    assert_eq!(h.controller.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_stale_epoch_messages_are_discarded() {
    let h = harness();

    h.controller.clone().connect(Language::En).await.unwrap();
    let stale = h.transport.take_side(0);

    h.controller.disconnect().await;
    h.controller.clone().connect(Language::En).await.unwrap();
    assert_eq!(h.transport.open_count(), 2);
    let fresh = h.transport.take_side(1);

    // The first session's server keeps talking after teardown; nothing of it
    // may reach the strengths list or the scheduler.
    let _ = stale
        .to_client
        .send(save_strength_message("fc-old", "Ghost"))
        .await;
    let _ = stale.to_client.send(audio_message(0.5)).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.controller.strengths().is_empty());
    assert_eq!(h.controller.active_playback(), 0);

    // The current epoch still works.
    fresh
        .to_client
        .send(save_strength_message("fc-new", "Persistence"))
        .await
        .unwrap();
    let controller = Arc::clone(&h.controller);
    wait_until(move || controller.strengths().len() == 1).await;
    assert_eq!(h.controller.strengths()[0].title, "Persistence");
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_releases_devices() {
    let h = harness();
    h.controller.clone().connect(Language::En).await.unwrap();
    assert!(h.mic_on.load(Ordering::SeqCst));

    h.controller.disconnect().await;
    assert_eq!(h.controller.state(), SessionState::Disconnected);
    assert!(!h.mic_on.load(Ordering::SeqCst), "mic released synchronously");
    assert_eq!(h.controller.volume(), 0.0, "meter resets on disconnect");

    // Second disconnect is a no-op
    h.controller.disconnect().await;
    assert_eq!(h.controller.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_transport_error_surfaces_and_returns_to_disconnected() {
    let h = harness();
    h.controller.clone().connect(Language::En).await.unwrap();
    let side = h.transport.take_side(0);

    side.to_client
        .send(ServerMessage {
            error: Some("stream reset".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let controller = Arc::clone(&h.controller);
    wait_until(move || controller.state() == SessionState::Disconnected).await;
    assert!(!h.mic_on.load(Ordering::SeqCst));
    assert_eq!(
        h.controller.last_error().as_deref(),
        Some("Connection lost. Please retry.")
    );
}

#[tokio::test]
async fn test_connect_timeout_fails_like_a_connection_error() {
    let mic_tx = Arc::new(Mutex::new(None));
    let mic_on = Arc::new(AtomicBool::new(false));
    let factory_tx = Arc::clone(&mic_tx);
    let factory_on = Arc::clone(&mic_on);
    let capture_factory: CaptureFactory = Box::new(move |_cfg| {
        Ok(Box::new(FakeCapture {
            chunk_tx: Arc::clone(&factory_tx),
            capturing: Arc::clone(&factory_on),
        }))
    });

    let controller = SessionController::new(
        SessionConfig {
            connect_timeout: Duration::from_millis(50),
            ..Default::default()
        },
        Arc::new(HangingTransport),
        capture_factory,
        Box::new(TestSink::default()),
    );

    let result = controller.clone().connect(Language::En).await;
    assert!(matches!(result, Err(SessionError::Connection(_))));
    assert_eq!(controller.state(), SessionState::Error);
    assert_eq!(
        controller.last_error().as_deref(),
        Some("Connection lost. Please retry.")
    );
    assert!(!mic_on.load(Ordering::SeqCst), "mic never started");

    // Retry is allowed from Error: a second attempt fails the same way
    // instead of being rejected outright.
    let retry = controller.clone().connect(Language::En).await;
    assert!(matches!(retry, Err(SessionError::Connection(_))));
}

#[tokio::test]
async fn test_device_error_surfaces_localized() {
    let transport = MockTransport::default();
    let capture_factory: CaptureFactory =
        Box::new(|_cfg| Err(DeviceError::Unavailable("permission denied".to_string())));

    let controller = SessionController::new(
        SessionConfig::default(),
        Arc::new(transport),
        capture_factory,
        Box::new(TestSink::default()),
    );

    let result = controller.clone().connect(Language::Zh).await;
    assert!(matches!(result, Err(SessionError::Device(_))));
    assert_eq!(controller.state(), SessionState::Error);
    assert_eq!(controller.last_error().as_deref(), Some("需要麦克风权限"));
}

#[tokio::test]
async fn test_language_change_tears_down_active_session() {
    let h = harness();
    h.controller.clone().connect(Language::En).await.unwrap();
    assert_eq!(h.controller.language(), Language::En);

    h.controller.set_language(Language::Zh).await;
    assert_eq!(h.controller.state(), SessionState::Disconnected);
    assert_eq!(h.controller.language(), Language::Zh);
    assert!(!h.mic_on.load(Ordering::SeqCst));
}
