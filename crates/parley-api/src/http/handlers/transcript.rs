//! Transcript endpoint.
//!
//! POST /api/email-transcript - Email a visitor the transcript of their session.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub sent: bool,
    pub message: String,
}

/// Sends synchronously: SMTP failures are reported to the caller.
pub async fn email_transcript(
    State(state): State<AppState>,
    Json(request): Json<TranscriptRequest>,
) -> Result<Json<ApiResponse<TranscriptResponse>>, AppError> {
    let clock = RequestClock::start();

    let session_id = request.session_id.unwrap_or_default();
    let email = request.email.unwrap_or_default();
    if session_id.trim().is_empty() || email.trim().is_empty() {
        return Err(AppError::Validation(
            "Session ID and email are required".to_string(),
        ));
    }

    let sink = state
        .email
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Email service not configured".to_string()))?;

    let messages = state.store.get_history(&session_id);
    if messages.is_empty() {
        return Err(AppError::NotFound(format!(
            "No conversation found for session '{session_id}'"
        )));
    }

    sink.send_transcript(&email, &session_id, &messages).await?;

    Ok(Json(clock.success(TranscriptResponse {
        sent: true,
        message: "Transcript sent successfully".to_string(),
    })))
}
