//! Consumer group endpoints

use std::time::Duration;

use crate::LogStreamClient;
use crate::error::Result;
use runlog_core::domain::group::{ConsumerId, GroupName};
use runlog_core::domain::job::JobId;
use runlog_core::domain::stream::Offset;
use runlog_core::dto::group::{
    AckRequest, AckResponse, ClaimRequest, GroupInfo, PendingSummary, ReadQuery, ReadResponse,
};

impl LogStreamClient {
    fn group_url(&self, job_id: &JobId, group: &GroupName, action: &str) -> String {
        self.url(&format!("/logs/{}/groups/{}/{}", job_id, group, action))
    }

    /// List the consumer groups of a job's stream
    pub async fn list_groups(&self, job_id: &JobId) -> Result<Vec<GroupInfo>> {
        let response = self
            .client
            .get(self.url(&format!("/logs/{}/groups", job_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Read entries through a consumer group
    ///
    /// # Arguments
    /// * `count` - Maximum number of entries (server default when `None`)
    /// * `block` - Wait up to this long when nothing is available
    /// * `resume` - Redeliver this consumer's unacknowledged entries first
    pub async fn read_group(
        &self,
        job_id: &JobId,
        group: &GroupName,
        consumer: &ConsumerId,
        count: Option<usize>,
        block: Option<Duration>,
        resume: bool,
    ) -> Result<ReadResponse> {
        let query = ReadQuery {
            consumer: consumer.as_str().to_string(),
            count,
            block_ms: block.map(|b| b.as_millis() as u64),
            resume: resume.then_some(true),
        };
        let response = self
            .client
            .get(self.group_url(job_id, group, "entries"))
            .query(&query)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Acknowledge delivered entries
    ///
    /// # Returns
    /// How many of `offsets` were still pending
    pub async fn ack(&self, job_id: &JobId, group: &GroupName, offsets: Vec<Offset>) -> Result<u64> {
        let response = self
            .client
            .post(self.group_url(job_id, group, "ack"))
            .json(&AckRequest { offsets })
            .send()
            .await?;

        let ack: AckResponse = self.handle_response(response).await?;
        Ok(ack.acknowledged)
    }

    /// Take over entries pending for at least `min_idle`
    pub async fn claim(
        &self,
        job_id: &JobId,
        group: &GroupName,
        consumer: &ConsumerId,
        min_idle: Duration,
        count: Option<usize>,
    ) -> Result<ReadResponse> {
        let req = ClaimRequest {
            consumer: consumer.as_str().to_string(),
            min_idle_ms: min_idle.as_millis() as u64,
            count,
        };
        let response = self
            .client
            .post(self.group_url(job_id, group, "claim"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Summarize a group's unacknowledged entries
    pub async fn pending(&self, job_id: &JobId, group: &GroupName) -> Result<PendingSummary> {
        let response = self
            .client
            .get(self.group_url(job_id, group, "pending"))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
