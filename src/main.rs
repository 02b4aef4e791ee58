use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use astra_voice::audio::{CaptureBackendFactory, CaptureConfig, CaptureSource, CpalPlaybackSink};
use astra_voice::session::{CaptureFactory, SessionController};
use astra_voice::{create_router, AppState, Config, WsLiveTransport};

#[derive(Debug, Parser)]
#[command(name = "astra-voice", about = "Voice session service for the Astra career guide")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/astra-voice")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Astra Voice v0.1.0");
    info!("Loaded config: {}", cfg.service.name);
    info!("Live model: {} (voice {})", cfg.live.model, cfg.live.voice);

    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        warn!("GEMINI_API_KEY is not set; live session opens will fail");
    }

    let transport = Arc::new(WsLiveTransport::new(cfg.live.url.clone(), api_key));

    let capture_factory: CaptureFactory = Box::new(|session_cfg| {
        CaptureBackendFactory::create(
            CaptureSource::Microphone,
            CaptureConfig {
                sample_rate: session_cfg.capture_sample_rate,
                channels: 1,
                chunk_samples: session_cfg.chunk_samples,
            },
        )
    });

    let sink = CpalPlaybackSink::open().context("Failed to open playback device")?;

    let controller = SessionController::new(
        cfg.session_config(),
        transport,
        capture_factory,
        Box::new(sink),
    );

    let state = AppState::new(controller);
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
