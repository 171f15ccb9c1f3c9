//! Producer and inspection endpoints

use crate::LogStreamClient;
use crate::error::Result;
use runlog_core::domain::job::JobId;
use runlog_core::domain::log::LogRecord;
use runlog_core::domain::stream::Offset;
use runlog_core::dto::group::SetupReport;
use runlog_core::dto::log::{AppendReport, LogsRequest};
use runlog_core::dto::stream::{ReplayQuery, ReplayResponse, StreamInfo};

impl LogStreamClient {
    // =============================================================================
    // Producer
    // =============================================================================

    /// Append a batch of log lines
    ///
    /// # Returns
    /// The per-line outcome; lines listed under `failed` or `notAttempted`
    /// can be resubmitted as they are
    pub async fn append_logs(&self, records: Vec<LogRecord>) -> Result<AppendReport> {
        let req = LogsRequest::from_records(records);
        let response = self
            .client
            .post(self.url("/logs"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create the job's stream and its consumer groups
    ///
    /// Idempotent; call it when a job starts and as often as needed after.
    pub async fn setup_consumer_groups(&self, job_id: &JobId) -> Result<SetupReport> {
        let url = self.url(&format!("/logs/{}/setup-consumer-groups", job_id));
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Inspection
    // =============================================================================

    /// Replay a job's stream from `after` without using a consumer group
    pub async fn replay(
        &self,
        job_id: &JobId,
        after: Offset,
        count: Option<usize>,
    ) -> Result<ReplayResponse> {
        let query = ReplayQuery {
            after: Some(after.get()),
            count,
        };
        let response = self
            .client
            .get(self.url(&format!("/logs/{}", job_id)))
            .query(&query)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a stream's length and last offset
    ///
    /// # Returns
    /// `None` when the job has no stream yet
    pub async fn stream_info(&self, job_id: &JobId) -> Result<Option<StreamInfo>> {
        let response = self
            .client
            .get(self.url(&format!("/logs/{}/info", job_id)))
            .send()
            .await?;

        match self.handle_response(response).await {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
