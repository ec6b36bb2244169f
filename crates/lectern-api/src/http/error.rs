//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use lectern_types::error::ChatError;

use crate::http::response::{ApiErrorDetail, ApiResponse};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors surfaced by the session coordinator.
    Chat(ChatError),
    /// Authentication failure.
    Unauthorized(String),
    /// Malformed request (bad UUID, missing multipart field).
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl AppError {
    /// Status code, machine-readable code, and whether a retry may succeed.
    pub fn classify(&self) -> (StatusCode, &'static str, bool) {
        match self {
            AppError::Chat(e) => {
                let (status, code) = match e {
                    ChatError::NotFound => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
                    ChatError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                    ChatError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                    ChatError::UnsupportedPlatform(_) => {
                        (StatusCode::NOT_IMPLEMENTED, "UNSUPPORTED_PLATFORM")
                    }
                    ChatError::NoSlidesUploaded => (StatusCode::NOT_FOUND, "NO_SLIDES_UPLOADED"),
                    ChatError::StoreCorrupted(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORE_CORRUPTED")
                    }
                    ChatError::CompletionUnavailable(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "COMPLETION_UNAVAILABLE")
                    }
                    ChatError::CompletionRejected(_) => {
                        (StatusCode::BAD_GATEWAY, "COMPLETION_REJECTED")
                    }
                    ChatError::SessionBusy { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "SESSION_BUSY")
                    }
                    ChatError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
                };
                (status, code, e.is_retriable())
            }
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", false),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", false),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", false),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Chat(e) => e.to_string(),
            AppError::Unauthorized(msg) | AppError::Validation(msg) | AppError::Internal(msg) => {
                msg.clone()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, retriable) = self.classify();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        } else {
            tracing::debug!(code, %message, "request rejected");
        }

        let body = ApiResponse::failure(ApiErrorDetail {
            code,
            message,
            retriable,
        });
        (status, Json(body)).into_response()
    }
}
