//! Log ingestion DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::JobId;
use crate::domain::log::{LogLine, LogRecord};
use crate::domain::stream::Offset;

/// Batch of log lines submitted by a producer
///
/// Lines may span several steps of one job, or several jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsRequest {
    pub data: Vec<LogLine>,
}

impl LogsRequest {
    pub fn from_records(records: impl IntoIterator<Item = LogRecord>) -> Self {
        Self {
            data: records.into_iter().map(LogLine::from).collect(),
        }
    }
}

/// A line that made it into its job's stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendedRecord {
    /// Position of the line in the submitted batch
    pub index: usize,
    pub job_id: JobId,
    pub step_id: String,
    pub line_number: u64,
    pub offset: Offset,
}

/// A line that was not appended, with whatever identifying context it carried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub index: usize,
    pub job_id: Option<JobId>,
    pub step_id: Option<String>,
    pub line_number: Option<u64>,
    pub reason: String,
    /// Whether resubmitting the same line may succeed
    #[serde(default)]
    pub retryable: bool,
}

impl RecordFailure {
    /// Identifying fields of a submitted line; `output` is not copied
    pub fn for_line(index: usize, line: &LogLine, reason: impl Into<String>) -> Self {
        Self {
            index,
            job_id: line.job_id.clone(),
            step_id: line.step_id.clone(),
            line_number: line.line_number,
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn for_record(index: usize, record: &LogRecord, reason: impl Into<String>) -> Self {
        Self {
            index,
            job_id: Some(record.job_id.clone()),
            step_id: Some(record.step_id.clone()),
            line_number: Some(record.line_number),
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// Per-line outcome of one ingestion call
///
/// - `rejected`: malformed lines, never sent to the store
/// - `failed`: lines whose append failed in the store, transiently or not
/// - `not_attempted`: lines skipped because an earlier line of the same job failed;
///   always safe to resubmit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendReport {
    pub received: usize,
    pub appended: Vec<AppendedRecord>,
    pub rejected: Vec<RecordFailure>,
    pub failed: Vec<RecordFailure>,
    pub not_attempted: Vec<RecordFailure>,
}

impl AppendReport {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when every received line was appended
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty() && self.failed.is_empty() && self.not_attempted.is_empty()
    }

    /// Lines a producer may resubmit: transient store failures and every
    /// line skipped behind a failure
    ///
    /// A line that failed permanently is left out; resending it would fail
    /// the same way on every attempt.
    pub fn retryable(&self) -> impl Iterator<Item = &RecordFailure> {
        self.failed
            .iter()
            .filter(|failure| failure.retryable)
            .chain(self.not_attempted.iter())
    }
}
