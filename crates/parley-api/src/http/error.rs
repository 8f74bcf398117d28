//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use parley_types::error::{ChatError, NotifyError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Malformed or missing request fields.
    Validation(String),
    /// Unknown session.
    NotFound(String),
    /// A dependency is not configured or the server is shutting down.
    Unavailable(String),
    /// Generic internal error.
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::InvalidInput(msg) => AppError::Validation(msg),
            ChatError::Cancelled => AppError::Unavailable("Server is shutting down".to_string()),
        }
    }
}

impl From<NotifyError> for AppError {
    fn from(e: NotifyError) -> Self {
        match e {
            NotifyError::Disabled(_) => {
                AppError::Unavailable("Email service not configured".to_string())
            }
            NotifyError::InvalidAddress(msg) => {
                AppError::Validation(format!("Invalid email address: {msg}"))
            }
            NotifyError::Delivery(msg) => {
                AppError::Internal(format!("Failed to send transcript: {msg}"))
            }
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.as_str()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.as_str()),
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg.as_str())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.as_str())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = message, "Request failed");
        }

        let body = ApiResponse::error(code, message, uuid::Uuid::now_v7().to_string(), 0);
        (status, Json(body)).into_response()
    }
}
