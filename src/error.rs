//! Error handling for meterhub

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found (unknown token, no image yet)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (missing image/token)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (token/state mismatch - caller should re-request a capture)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure (publish could not complete)
    #[error("Storage error: {0}")]
    Storage(String),

    /// OCR collaborator failure
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            Error::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                msg.clone(),
            ),
            Error::Collaborator(msg) => (
                StatusCode::BAD_GATEWAY,
                "COLLABORATOR_ERROR",
                msg.clone(),
            ),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::warn!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        // Conflicts carry a retry flag so the dashboard can distinguish
        // "re-issue a capture request" from a hard failure.
        let body = Json(json!({
            "error_code": error_code,
            "message": message,
            "retry": matches!(self, Error::Conflict(_))
        }));

        (status, body).into_response()
    }
}
