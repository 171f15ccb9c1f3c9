//! Destination for shipped log lines

use async_trait::async_trait;
use runlog_core::domain::job::JobId;
use runlog_core::domain::log::LogRecord;
use runlog_core::dto::group::SetupReport;
use runlog_core::dto::log::AppendReport;

use crate::LogStreamClient;
use crate::error::Result;

/// Where a [`crate::LogShipper`] sends its batches
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send one batch; the report tells which lines made it
    async fn send_logs(&self, records: Vec<LogRecord>) -> Result<AppendReport>;

    async fn setup_consumer_groups(&self, job_id: &JobId) -> Result<SetupReport>;
}

#[async_trait]
impl LogSink for LogStreamClient {
    async fn send_logs(&self, records: Vec<LogRecord>) -> Result<AppendReport> {
        self.append_logs(records).await
    }

    async fn setup_consumer_groups(&self, job_id: &JobId) -> Result<SetupReport> {
        LogStreamClient::setup_consumer_groups(self, job_id).await
    }
}
