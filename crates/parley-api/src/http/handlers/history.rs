//! Session history endpoints.
//!
//! GET    /api/history/{session_id} - Messages of a session, oldest first.
//! DELETE /api/history/{session_id} - Forget a session.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use parley_types::chat::ChatMessage;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    /// Whether a session existed and was removed.
    pub cleared: bool,
    pub message: String,
}

/// GET /api/history/{session_id} - Unknown sessions yield an empty list.
pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<HistoryResponse>>, AppError> {
    let clock = RequestClock::start();
    require_session_id(&session_id)?;

    let messages = state.store.get_history(&session_id);
    Ok(Json(clock.success(HistoryResponse {
        count: messages.len(),
        session_id,
        messages,
    })))
}

/// DELETE /api/history/{session_id} - Idempotent.
pub async fn clear_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<ClearResponse>>, AppError> {
    let clock = RequestClock::start();
    require_session_id(&session_id)?;

    let cleared = state.store.clear_history(&session_id);
    tracing::info!(session_id = %session_id, cleared, "History cleared");

    Ok(Json(clock.success(ClearResponse {
        cleared,
        message: "History cleared".to_string(),
    })))
}

pub(crate) fn require_session_id(session_id: &str) -> Result<(), AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::Validation("Session ID is required".to_string()));
    }
    Ok(())
}
