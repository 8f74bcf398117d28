//! Service statistics endpoint.
//!
//! GET /api/stats - Live session counts plus process-level figures.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use parley_types::chat::StoreStats;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub sessions: StoreStats,
    pub provider: String,
    pub uptime_secs: i64,
    /// Exchange notifications dropped because the queue was full.
    pub notifications_dropped: u64,
}

pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatsResponse>>, AppError> {
    let clock = RequestClock::start();

    let stats = StatsResponse {
        sessions: state.store.stats(),
        provider: state.orchestrator.provider_name().to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        notifications_dropped: state.notifier.as_ref().map_or(0, |n| n.dropped()),
    };

    Ok(Json(clock.success(stats)))
}
