//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request or unresolvable session
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rejected by policy
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Anything else
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    /// Create a bad request error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code string for the response body.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::Forbidden(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
        }
    }
}

impl From<ssehub_core::Error> for ApiError {
    fn from(err: ssehub_core::Error) -> Self {
        use ssehub_core::Error;

        match err {
            Error::BadRequest(msg) => ApiError::BadRequest(msg),
            Error::SessionNotFound(key) => {
                ApiError::BadRequest(format!("no live session for key '{key}'"))
            }
            Error::SessionClosed | Error::SlowConsumer(_) => {
                ApiError::BadRequest("session is closed".to_string())
            }
            Error::Serialization(e) => ApiError::BadRequest(format!("invalid JSON body: {e}")),
            Error::Forbidden(msg) => ApiError::Forbidden(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            ApiError::Internal(_) => error!("Request failed: {}", self),
            ApiError::Forbidden(_) => warn!("Request rejected: {}", self),
            ApiError::BadRequest(_) => debug!("Bad request: {}", self),
        }

        let body = ErrorBody {
            error: self.error_code(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for HTTP handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
