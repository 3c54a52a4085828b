//! Error types for the CVR sync server

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// HTTP-facing application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The client spoke a pull protocol this endpoint does not serve
    #[error("Unsupported pull version {version}, use {location}")]
    ProtocolVersionMismatch { version: i64, location: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised by the CVR engine
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unsupported pull version: {0}")]
    UnsupportedPullVersion(i64),

    #[error("Client group not found: {0}")]
    GroupNotFound(String),

    #[error("Invalid table registration: {0}")]
    InvalidRegistration(String),

    #[error("Predicate placeholders do not match binds: {0}")]
    InvalidPredicate(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the failure came from storage contention and the pull can be
    /// retried with the same cookie.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Database(sqlx::Error::PoolTimedOut) => true,
            SyncError::Database(sqlx::Error::Database(e)) => e
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                // primary result code: SQLITE_BUSY (5) or SQLITE_LOCKED (6)
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::ProtocolVersionMismatch { version, location } => {
                tracing::info!("Redirecting pull version {} to {}", version, location);
                return (
                    StatusCode::TEMPORARY_REDIRECT,
                    [(header::LOCATION, location.clone())],
                )
                    .into_response();
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Sync(e) if e.is_transient() => {
                tracing::warn!("Pull contended, client should retry: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "retry",
                    "Storage is busy, retry with the same cookie".to_string(),
                )
            }
            AppError::Sync(SyncError::UnsupportedPullVersion(version)) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("Unsupported pull version: {}", version),
            ),
            AppError::Sync(e) => {
                tracing::error!("Sync error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "sync_error",
                    "Pull failed".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
