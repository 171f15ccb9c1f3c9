//! Log API Handlers
//!
//! Ingestion and consumer-group setup endpoints used by job executors.

use axum::{
    Json,
    extract::{Path, State},
};
use runlog_core::domain::job::JobId;
use runlog_core::dto::group::SetupReport;
use runlog_core::dto::log::{AppendReport, LogsRequest};

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /logs
/// Append a batch of log lines to their jobs' streams
pub async fn append_logs(
    State(state): State<AppState>,
    Json(req): Json<LogsRequest>,
) -> ApiResult<Json<AppendReport>> {
    tracing::debug!("Received {} log lines", req.data.len());

    let report = state.ingestion.append_logs(req.data).await?;

    Ok(Json(report))
}

/// POST /logs/{jobId}/setup-consumer-groups
/// Create the job's stream and its consumer groups; safe to repeat
pub async fn setup_consumer_groups(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<SetupReport>> {
    let job_id = JobId::parse(job_id)?;
    tracing::info!("Setting up consumer groups for job {}", job_id);

    let report = state.setup.prepare(&job_id).await?;

    Ok(Json(report))
}
