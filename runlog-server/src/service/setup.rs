//! Consumer Setup Service
//!
//! Prepares a job's stream for consumption. Called when a job starts and
//! again by anything that wants to be sure the groups exist; every call after
//! the first is a no-op.

use std::sync::Arc;

use runlog_core::domain::job::{JobId, JobIdError, StreamKey};
use runlog_core::dto::group::SetupReport;
use thiserror::Error;

use super::consumer_groups::ConsumerGroupManager;
use crate::store::StreamStore;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    InvalidJobId(#[from] JobIdError),
}

#[derive(Clone)]
pub struct ConsumerSetupService {
    store: Arc<dyn StreamStore>,
    groups: ConsumerGroupManager,
}

impl ConsumerSetupService {
    pub fn new(store: Arc<dyn StreamStore>, groups: ConsumerGroupManager) -> Self {
        Self { store, groups }
    }

    /// Ensure the stream exists and register the consumer groups
    ///
    /// Store failures never surface here: they are logged and show up as
    /// failed groups in the report.
    pub async fn prepare(&self, job_id: &JobId) -> Result<SetupReport, SetupError> {
        job_id.check()?;

        let key = StreamKey::for_job(job_id);
        match self.store.ensure_stream(&key).await {
            Ok(true) => tracing::debug!("Created log stream for job {}", job_id),
            Ok(false) => {}
            Err(e) => tracing::warn!(job_id = %job_id, "Failed to ensure log stream: {}", e),
        }

        Ok(self.groups.setup_consumer_groups(job_id).await)
    }
}
