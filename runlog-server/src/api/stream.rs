//! Stream API Handlers
//!
//! Group-independent replay and stream metadata.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use runlog_core::domain::job::JobId;
use runlog_core::domain::stream::Offset;
use runlog_core::dto::stream::{ReplayQuery, ReplayResponse, StreamInfo};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /logs/{jobId}
/// Replay a job's stream from an offset without touching any group
pub async fn replay(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ReplayQuery>,
) -> ApiResult<Json<ReplayResponse>> {
    let job_id = JobId::parse(job_id)?;
    let after = Offset::new(query.after.unwrap_or(0));

    let response = state
        .reader
        .replay(&job_id, after, query.count)
        .await?;

    Ok(Json(response))
}

/// GET /logs/{jobId}/info
pub async fn stream_info(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StreamInfo>> {
    let job_id = JobId::parse(job_id)?;

    let info = state
        .reader
        .stream_info(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No log stream for job {}", job_id)))?;

    Ok(Json(info))
}
