//! Unified API error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::api::models::ErrorResponse;
use crate::error::TrackerError;

/// API-specific error type.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Invalid request parameters, including rejected raw queries.
    BadRequest(String),
    /// Internal server error.
    InternalError(String),
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Database operation failed.
    DatabaseError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                "Rate limit exceeded. Please try again later.".to_string(),
            ),
            Self::DatabaseError(msg) => {
                error!(error = %msg, "Database error in API handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database operation failed".to_string(),
                )
            }
            Self::InternalError(msg) => {
                error!(error = %msg, "Internal error in API handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        });

        (status, body).into_response()
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::DatabaseError { message, source } => {
                let detail = source.map_or(message.clone(), |s| format!("{message}: {s}"));
                Self::DatabaseError(detail)
            }
            _ => Self::InternalError(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

/// Map a failed caller-supplied query onto a client error with the cause.
#[must_use]
pub fn raw_query_error(err: TrackerError) -> ApiError {
    match err {
        TrackerError::DatabaseError {
            message,
            source: Some(source),
        } => ApiError::BadRequest(format!("{message}: {source}")),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::RateLimitExceeded.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(TrackerError::database("boom".to_string(), None))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_raw_query_failure_is_bad_request() {
        let err = TrackerError::database(
            "Raw query failed".to_string(),
            Some(Box::new(std::io::Error::other("no such table: nope"))),
        );
        assert!(matches!(
            raw_query_error(err),
            ApiError::BadRequest(msg) if msg.contains("no such table")
        ));
    }
}
