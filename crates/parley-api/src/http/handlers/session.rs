//! GET /api/sessions/{session_id} - Session metadata without its messages.

use axum::extract::{Path, State};
use axum::Json;

use parley_types::chat::SessionInfo;

use crate::http::error::AppError;
use crate::http::handlers::history::require_session_id;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionInfo>>, AppError> {
    let clock = RequestClock::start();
    require_session_id(&session_id)?;

    let info = state
        .store
        .session_info(&session_id)
        .ok_or_else(|| AppError::NotFound(format!("Session '{session_id}' not found")))?;

    Ok(Json(clock.success(info)))
}
