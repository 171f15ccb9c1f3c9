//! Consumer Group API Handlers
//!
//! Group reads, acknowledgements, reclaim and inspection for CLI and UI
//! consumers.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use runlog_core::domain::group::{ConsumerId, GroupName};
use runlog_core::domain::job::JobId;
use runlog_core::dto::group::{
    AckRequest, AckResponse, ClaimRequest, GroupInfo, PendingSummary, ReadQuery, ReadResponse,
};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::ReadOptions;

fn parse_target(job_id: String, group: String) -> ApiResult<(JobId, GroupName)> {
    Ok((JobId::parse(job_id)?, GroupName::parse(group)?))
}

/// GET /logs/{jobId}/groups
pub async fn list_groups(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Vec<GroupInfo>>> {
    let groups = state.reader.groups(&JobId::parse(job_id)?).await?;

    Ok(Json(groups))
}

/// GET /logs/{jobId}/groups/{group}/entries
/// Read entries through a consumer group
pub async fn read_entries(
    State(state): State<AppState>,
    Path((job_id, group)): Path<(String, String)>,
    Query(query): Query<ReadQuery>,
) -> ApiResult<Json<ReadResponse>> {
    let (job_id, group) = parse_target(job_id, group)?;
    let consumer = ConsumerId::parse(query.consumer)?;

    let options = ReadOptions {
        count: query.count,
        block: query.block_ms.map(Duration::from_millis),
        resume: query.resume.unwrap_or(false),
    };

    let entries = state
        .reader
        .read(&job_id, &group, &consumer, options)
        .await?;

    tracing::debug!(
        "Delivered {} entries of job {} to {}/{}",
        entries.len(),
        job_id,
        group,
        consumer
    );

    Ok(Json(ReadResponse {
        job_id,
        group,
        consumer,
        entries,
    }))
}

/// POST /logs/{jobId}/groups/{group}/ack
pub async fn ack_entries(
    State(state): State<AppState>,
    Path((job_id, group)): Path<(String, String)>,
    Json(req): Json<AckRequest>,
) -> ApiResult<Json<AckResponse>> {
    let (job_id, group) = parse_target(job_id, group)?;

    let acknowledged = state.reader.ack(&job_id, &group, &req.offsets).await?;

    Ok(Json(AckResponse { acknowledged }))
}

/// POST /logs/{jobId}/groups/{group}/claim
/// Take over entries other consumers left pending for too long
pub async fn claim_entries(
    State(state): State<AppState>,
    Path((job_id, group)): Path<(String, String)>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<Json<ReadResponse>> {
    let (job_id, group) = parse_target(job_id, group)?;
    let consumer = ConsumerId::parse(req.consumer)?;

    let entries = state
        .reader
        .claim(
            &job_id,
            &group,
            &consumer,
            Duration::from_millis(req.min_idle_ms),
            req.count,
        )
        .await?;

    Ok(Json(ReadResponse {
        job_id,
        group,
        consumer,
        entries,
    }))
}

/// GET /logs/{jobId}/groups/{group}/pending
pub async fn pending_summary(
    State(state): State<AppState>,
    Path((job_id, group)): Path<(String, String)>,
) -> ApiResult<Json<PendingSummary>> {
    let (job_id, group) = parse_target(job_id, group)?;

    let summary = state.reader.pending(&job_id, &group).await?;

    Ok(Json(summary))
}
