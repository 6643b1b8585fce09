use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the memory core (adapters, manager, queue).
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Store or provider unreachable after the adapter's retry budget.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Rejected before any side effect.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Embedding queue is full")]
    QueueFull,
}

impl MemoryError {
    pub fn is_backend(&self) -> bool {
        matches!(self, MemoryError::BackendUnavailable(_))
    }
}

impl From<sqlx::Error> for MemoryError {
    fn from(err: sqlx::Error) -> Self {
        MemoryError::BackendUnavailable(format!("vector database: {}", err))
    }
}

impl From<redis::RedisError> for MemoryError {
    fn from(err: redis::RedisError) -> Self {
        MemoryError::BackendUnavailable(format!("key-value store: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Validation(msg) => ApiError::BadRequest(msg),
            MemoryError::BackendUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            MemoryError::QueueFull => ApiError::ServiceUnavailable(err.to_string()),
            MemoryError::Serialization(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized", msg)
            }
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::error!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
