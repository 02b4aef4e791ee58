use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage, SessionSetup};

/// Remote session failed to open or closed unexpectedly. Surfaced to the
/// user and triggers a full disconnect.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open live session: {0}")]
    Open(String),

    #[error("live session closed: {0}")]
    Closed(String),

    #[error("live session connect timed out")]
    Timeout,
}

/// An open live session.
///
/// `outbound` is an unbounded FIFO queue drained by a dedicated writer
/// task: enqueueing never blocks the capture path and never drops a frame
/// that was already captured. `inbound` delivers server messages in arrival
/// order; the receiver is consumed by the session controller's single
/// dispatch task.
pub struct LiveConnection {
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::Receiver<ServerMessage>,
}

impl LiveConnection {
    pub fn new(
        outbound: mpsc::UnboundedSender<ClientMessage>,
        inbound: mpsc::Receiver<ServerMessage>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens logical sessions with the remote conversational agent.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    async fn open(&self, setup: SessionSetup) -> Result<LiveConnection, ConnectionError>;
}

/// Production transport: JSON messages over WebSocket.
pub struct WsLiveTransport {
    url: String,
    api_key: String,
}

impl WsLiveTransport {
    pub fn new(url: String, api_key: String) -> Self {
        Self { url, api_key }
    }

    fn endpoint(&self) -> String {
        if self.api_key.is_empty() {
            self.url.clone()
        } else {
            format!("{}?key={}", self.url, self.api_key)
        }
    }
}

#[async_trait]
impl LiveTransport for WsLiveTransport {
    async fn open(&self, setup: SessionSetup) -> Result<LiveConnection, ConnectionError> {
        let (ws, _) = tokio_tungstenite::connect_async(self.endpoint())
            .await
            .map_err(|e| ConnectionError::Open(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let setup_frame = serde_json::json!({ "setup": &setup }).to_string();
        sink.send(Message::Text(setup_frame))
            .await
            .map_err(|e| ConnectionError::Open(e.to_string()))?;

        info!(model = %setup.model, "live session opened");

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerMessage>(64);

        // Writer: drains the outbound queue in FIFO order. Send failures are
        // logged, not surfaced to the capture path.
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("live session send failed: {}", e);
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            debug!("live session writer task stopped");
        });

        // Reader: parses server messages; a close or transport error becomes
        // one final error-carrying message so the dispatcher can tear down.
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                if inbound_tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("failed to parse server message: {}", e);
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by server".to_string());
                        let _ = inbound_tx
                            .send(ServerMessage {
                                error: Some(reason),
                                ..Default::default()
                            })
                            .await;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = inbound_tx
                            .send(ServerMessage {
                                error: Some(e.to_string()),
                                ..Default::default()
                            })
                            .await;
                        break;
                    }
                }
            }
            debug!("live session reader task stopped");
        });

        Ok(LiveConnection::new(outbound_tx, inbound_rx))
    }
}
