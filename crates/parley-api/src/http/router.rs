//! Axum router configuration with middleware.
//!
//! All routes are under `/api/`.
//! Middleware: CORS (restricted to `server.allowed_origins` when set) and
//! request tracing.

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use parley_types::config::ServerConfig;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(handlers::chat::send_message))
        .route(
            "/history/{session_id}",
            get(handlers::history::get_history).delete(handlers::history::clear_history),
        )
        .route("/email-transcript", post(handlers::transcript::email_transcript))
        .route("/sessions/{session_id}", get(handlers::session::get_session))
        .route("/stats", get(handlers::stats::get_stats));

    Router::new()
        .nest("/api", api_routes)
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when `origins` is empty; otherwise only the valid entries.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// GET /api/health - Liveness check, outside the envelope.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "parley",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
