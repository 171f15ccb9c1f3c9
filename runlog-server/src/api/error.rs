//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use runlog_core::domain::group::NameError;
use runlog_core::domain::job::JobIdError;

use crate::service::{IngestError, SetupError};
use crate::store::StoreError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Transient backend failure; the client may retry
    Unavailable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => {
                tracing::warn!("Stream store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::GroupNotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Unavailable(_) => ApiError::Unavailable(err.to_string()),
            StoreError::Backend(_) | StoreError::Corrupt(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<SetupError> for ApiError {
    fn from(err: SetupError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<NameError> for ApiError {
    fn from(err: NameError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JobIdError> for ApiError {
    fn from(err: JobIdError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use runlog_core::domain::group::GroupName;
    use runlog_core::domain::job::{JobId, StreamKey};

    #[test]
    fn test_store_errors_map_to_status_codes() {
        let key = StreamKey::for_job(&JobId::from(1));
        let cases = [
            (
                StoreError::group_not_found(&key, &GroupName::cli()),
                StatusCode::NOT_FOUND,
            ),
            (
                StoreError::Unavailable("down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                StoreError::Backend("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let err = IngestError::BatchTooLarge { size: 2, max: 1 };
        assert_eq!(
            ApiError::from(err).into_response().status(),
            StatusCode::BAD_REQUEST
        );

        let err = JobId::parse("1".repeat(JobId::MAX_LEN + 1)).unwrap_err();
        assert_eq!(
            ApiError::from(err).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
