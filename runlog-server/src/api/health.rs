//! Liveness endpoint

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health
///
/// Answers as long as the process serves HTTP; does not probe the store.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
