//! API Module
//!
//! HTTP boundary of the log stream server.
//! Each submodule handles endpoints for one concern.

pub mod error;
pub mod groups;
pub mod health;
pub mod logs;
pub mod stream;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::service::{
    ConsumerGroupManager, ConsumerSetupService, IngestLimits, LogIngestionService, LogReader,
    ReaderSettings,
};
use crate::store::StreamStore;

/// Services shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestion: LogIngestionService,
    pub setup: ConsumerSetupService,
    pub reader: LogReader,
}

impl AppState {
    /// Wire every service to one store
    pub fn new(store: Arc<dyn StreamStore>, config: &Config) -> Self {
        let groups = ConsumerGroupManager::new(store.clone(), config.consumer_groups.clone());

        Self {
            ingestion: LogIngestionService::new(
                store.clone(),
                IngestLimits {
                    max_batch_size: config.max_batch_size,
                    max_output_length: config.max_output_length,
                },
            ),
            setup: ConsumerSetupService::new(store.clone(), groups),
            reader: LogReader::new(
                store,
                ReaderSettings {
                    pending_timeout: config.pending_timeout,
                    default_count: config.default_read_count,
                    max_count: config.max_read_count,
                    poll_interval: config.read_poll_interval,
                    max_block: config.max_block,
                },
            ),
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Producer endpoints
        .route("/logs", post(logs::append_logs))
        .route(
            "/logs/{job_id}/setup-consumer-groups",
            post(logs::setup_consumer_groups),
        )
        // Stream endpoints
        .route("/logs/{job_id}", get(stream::replay))
        .route("/logs/{job_id}/info", get(stream::stream_info))
        // Consumer group endpoints
        .route("/logs/{job_id}/groups", get(groups::list_groups))
        .route(
            "/logs/{job_id}/groups/{group}/entries",
            get(groups::read_entries),
        )
        .route("/logs/{job_id}/groups/{group}/ack", post(groups::ack_entries))
        .route(
            "/logs/{job_id}/groups/{group}/claim",
            post(groups::claim_entries),
        )
        .route(
            "/logs/{job_id}/groups/{group}/pending",
            get(groups::pending_summary),
        )
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
