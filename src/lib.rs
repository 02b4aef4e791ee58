pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod locale;
pub mod session;

pub use audio::{
    AudioChunk, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureSource, ChunkFramer,
    CodecError, CpalCaptureBackend, CpalPlaybackSink, DeviceError, PlaybackBuffer, PlaybackConfig,
    PlaybackScheduler, PlaybackSink, VolumeMeter,
};
pub use config::Config;
pub use error::SessionError;
pub use http::{create_router, AppState};
pub use live::{
    AudioPayload, ClientMessage, ConnectionError, LiveConnection, LiveTransport, ServerMessage,
    SessionSetup, ToolCallMessage, ToolDeclaration, ToolResponseMessage, WsLiveTransport,
};
pub use locale::Language;
pub use session::{
    CaptureFactory, SessionConfig, SessionController, SessionSnapshot, SessionState,
    StrengthRecord, ToolMediator,
};
