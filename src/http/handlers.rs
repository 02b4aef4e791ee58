use super::state::AppState;
use crate::locale::Language;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// Conversation language ("en" or "zh"); defaults to the current one
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub state: crate::session::SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/connect
/// Open the live session and start capturing
pub async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> impl IntoResponse {
    let language = match req.language {
        Some(raw) => match raw.parse::<Language>() {
            Ok(language) => language,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e }))
                    .into_response();
            }
        },
        None => state.controller.language(),
    };

    info!(?language, "connect requested");

    match state.controller.clone().connect(language).await {
        Ok(()) => (
            StatusCode::OK,
            Json(CommandResponse {
                state: state.controller.state(),
                message: "session connected".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("connect failed: {}", e);
            let error = state
                .controller
                .last_error()
                .unwrap_or_else(|| e.to_string());
            (StatusCode::BAD_GATEWAY, Json(ErrorResponse { error })).into_response()
        }
    }
}

/// POST /session/disconnect
/// Tear down the current session (idempotent)
pub async fn disconnect(State(state): State<AppState>) -> impl IntoResponse {
    info!("disconnect requested");
    state.controller.disconnect().await;

    (
        StatusCode::OK,
        Json(CommandResponse {
            state: state.controller.state(),
            message: "session disconnected".to_string(),
        }),
    )
        .into_response()
}

/// POST /session/language
/// Switch conversation language; tears down an active session
pub async fn set_language(
    State(state): State<AppState>,
    Json(req): Json<LanguageRequest>,
) -> impl IntoResponse {
    match req.language.parse::<Language>() {
        Ok(language) => {
            state.controller.set_language(language).await;
            (
                StatusCode::OK,
                Json(CommandResponse {
                    state: state.controller.state(),
                    message: format!("language set to {:?}", language),
                }),
            )
                .into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e })).into_response(),
    }
}

/// GET /session
/// Current state, volume envelope, strengths and last error
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.snapshot())).into_response()
}

/// GET /session/strengths
/// Ordered list of recorded strengths
pub async fn get_strengths(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.strengths())).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
