//! Log Ingestion Service
//!
//! Appends batches of submitted log lines to their jobs' streams, in batch
//! order.

use std::collections::HashSet;
use std::sync::Arc;

use runlog_core::domain::job::JobId;
use runlog_core::domain::log::LogLine;
use runlog_core::dto::log::{AppendReport, AppendedRecord, RecordFailure};
use thiserror::Error;

use crate::store::StreamStore;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Too many log entries in batch: {size} (max: {max})")]
    BatchTooLarge { size: usize, max: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct IngestLimits {
    pub max_batch_size: usize,
    pub max_output_length: usize,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_output_length: 10_000,
        }
    }
}

#[derive(Clone)]
pub struct LogIngestionService {
    store: Arc<dyn StreamStore>,
    limits: IngestLimits,
}

impl LogIngestionService {
    pub fn new(store: Arc<dyn StreamStore>, limits: IngestLimits) -> Self {
        Self { store, limits }
    }

    /// Append a batch of lines
    ///
    /// Malformed lines are rejected on their own. When an append fails, the
    /// rest of that job's lines in this batch are skipped so that a resubmitted
    /// remainder lands in order; other jobs in the batch are unaffected. The
    /// successful prefix stays appended. Nothing is buffered or retried here.
    pub async fn append_logs(&self, lines: Vec<LogLine>) -> Result<AppendReport, IngestError> {
        if lines.is_empty() {
            return Ok(AppendReport::empty());
        }

        if lines.len() > self.limits.max_batch_size {
            return Err(IngestError::BatchTooLarge {
                size: lines.len(),
                max: self.limits.max_batch_size,
            });
        }

        let mut report = AppendReport {
            received: lines.len(),
            ..AppendReport::default()
        };
        let mut halted: HashSet<JobId> = HashSet::new();

        for (index, line) in lines.into_iter().enumerate() {
            let context = RecordFailure::for_line(index, &line, String::new());

            let record = match line.validate(self.limits.max_output_length) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        index,
                        job_id = ?context.job_id.as_ref().map(JobId::as_str),
                        step_id = ?context.step_id,
                        line_number = ?context.line_number,
                        "Rejected log line: {}",
                        e
                    );
                    report.rejected.push(RecordFailure {
                        reason: e.to_string(),
                        ..context
                    });
                    continue;
                }
            };

            if halted.contains(&record.job_id) {
                report.not_attempted.push(
                    RecordFailure::for_record(
                        index,
                        &record,
                        "an earlier line of this job failed to append",
                    )
                    .with_retryable(true),
                );
                continue;
            }

            match self.store.append(&record.stream_key(), &record).await {
                Ok(offset) => report.appended.push(AppendedRecord {
                    index,
                    job_id: record.job_id,
                    step_id: record.step_id,
                    line_number: record.line_number,
                    offset,
                }),
                Err(e) => {
                    tracing::error!(
                        job_id = %record.job_id,
                        step_id = %record.step_id,
                        line_number = record.line_number,
                        retryable = e.is_retryable(),
                        "Failed to append log line: {}",
                        e
                    );
                    report.failed.push(
                        RecordFailure::for_record(index, &record, e.to_string())
                            .with_retryable(e.is_retryable()),
                    );
                    halted.insert(record.job_id);
                }
            }
        }

        tracing::debug!(
            "Appended {} of {} log lines",
            report.appended.len(),
            report.received
        );

        Ok(report)
    }
}
