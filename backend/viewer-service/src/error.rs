use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheError;
use crate::db::StoreError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, expired, stale or mismatched credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A concurrent mutation won the race; the caller may retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Downstream store or cache unreachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Downstream call exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures caused by an unreachable or slow dependency.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AppError::Unavailable(_) | AppError::Timeout { .. })
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unavailable(_) => "UNAVAILABLE",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
    success: bool,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Don't leak store or signing internals to clients
        let message = match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Unavailable(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: self.error_type(),
            message,
            status: status.as_u16(),
            success: false,
        })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Conflict(what) => AppError::Conflict(what),
            StoreError::Duplicate(what) => AppError::AlreadyExists(what),
            StoreError::Database(msg) => {
                tracing::error!("Record store error: {}", msg);
                AppError::Unavailable(msg)
            }
        }
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Timeout(after) => AppError::Timeout {
                operation: "cache call",
                after,
            },
            CacheError::Backend(msg) => AppError::Unavailable(msg),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AppError::Unauthorized("Token expired".to_string()),
            ErrorKind::InvalidSignature => {
                AppError::Unauthorized("Token signature is invalid".to_string())
            }
            _ => AppError::Unauthorized("Invalid token".to_string()),
        }
    }
}
