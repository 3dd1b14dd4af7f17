//! Route handler functions for all API endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use premia_chat::{ChatTurnResult, SessionSnapshot};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Chat
// =============================================================================

/// Request body for POST /chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// POST /chat - process one user message.
///
/// Omitting `conversation_id` starts a new conversation; the generated id is
/// returned in the response.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatTurnResult>, ApiError> {
    let Json(body) = payload?;
    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("'message' must not be empty".to_string()))?;

    let result = state
        .controller
        .handle_turn(&message, body.conversation_id.as_deref())
        .await
        .map_err(|e| {
            warn!(error = %e, "Chat turn failed");
            ApiError::from(e)
        })?;

    Ok(Json(result))
}

// =============================================================================
// Sessions
// =============================================================================

/// GET /sessions/{id} - inspect a conversation.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .controller
        .session_snapshot(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Conversation '{}' not found", id)))
}

/// DELETE /sessions/{id} - forget a conversation.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.controller.reset_session(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Conversation '{}' not found", id)))
    }
}

// =============================================================================
// Health
// =============================================================================

/// Response body for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: u64,
}

/// GET /health - liveness and basic counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.controller.active_sessions() as u64,
    })
}
