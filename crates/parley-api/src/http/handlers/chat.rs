//! Chat endpoint.
//!
//! POST /api/chat - Answer one visitor message.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_types::chat::ReplySource;
use parley_types::config::ChatContext;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

/// Body of `POST /api/chat`.
///
/// Fields are optional here so that missing ones produce the same
/// validation error as blank ones.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Per-request branding and FAQ overrides from the embedding page.
    #[serde(default)]
    pub context: Option<ChatContext>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: ReplySource,
}

/// POST /api/chat - Produce the reply for one user message.
///
/// Returns 400 for a blank message or session id and 503 if the server starts
/// shutting down before the reply is ready. Model failures still return 200
/// with an apology reply.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatResponse>>, AppError> {
    let clock = RequestClock::start();

    let session_id = request.session_id.unwrap_or_default();
    let message = request.message.unwrap_or_default();
    let context = request.context.unwrap_or_default();

    let reply = state
        .orchestrator
        .respond_with_cancel(&session_id, &message, &context, &state.shutdown)
        .await?;

    Ok(Json(clock.success(ChatResponse {
        reply: reply.text,
        session_id,
        timestamp: Utc::now(),
        source: reply.source,
    })))
}
