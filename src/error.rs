//! # Error Handling
//!
//! Defines the two error families used across the server:
//!
//! - **AppError**: HTTP-facing errors with a consistent JSON envelope, returned
//!   by request handlers via the `ResponseError` trait.
//! - **PipelineError**: failures inside a session's audio pipeline. These are
//!   always session-local: they are logged, turned into outbound messages where
//!   the protocol calls for one, and never escalate past the owning session.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// HTTP-facing error types for the application.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **ValidationError**: Data validation failed (400 errors)
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found (e.g. metrics for an unknown client id)
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// Converts an `AppError` into the JSON error envelope all endpoints share:
///
/// ```json
/// {
///   "error": {
///     "type": "not_found",
///     "message": "no session for client id 'abc'",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

/// Failures inside a session's audio pipeline.
///
/// ## Propagation Policy:
/// Every variant is session-local and non-fatal to the process:
/// - **Segmentation**: the window still counts toward total audio, yields no
///   segments, and the session continues with the next window.
/// - **NoiseReduction**: the segment is forwarded uncleaned and still counts
///   as processed.
/// - **Transcription**: the client receives an error message for that segment;
///   subsequent segments are unaffected.
#[derive(Debug)]
pub enum PipelineError {
    /// The speech classifier failed on a window
    Segmentation(String),

    /// The noise reduction capability failed on a segment
    NoiseReduction(String),

    /// The external transcription call failed or timed out
    Transcription(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Segmentation(msg) => write!(f, "segmentation failed: {}", msg),
            PipelineError::NoiseReduction(msg) => write!(f, "noise reduction failed: {}", msg),
            PipelineError::Transcription(msg) => write!(f, "transcription failed: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("no session for client id 'abc'".to_string());
        assert_eq!(err.to_string(), "Not found: no session for client id 'abc'");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::Transcription("timed out after 30s".to_string());
        assert_eq!(err.to_string(), "transcription failed: timed out after 30s");
    }
}
