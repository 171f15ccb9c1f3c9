//! Batched log shipping for job executors
//!
//! Lines are queued as the job produces them and sent in batches. A batch
//! that cannot be delivered goes back to the front of the queue in its
//! original order, so lines of a job always reach the server in the order
//! they were pushed.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use runlog_core::domain::job::JobId;
use runlog_core::domain::log::LogRecord;
use runlog_core::dto::group::SetupReport;
use runlog_core::dto::log::AppendReport;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::sink::LogSink;

/// How often [`LogShipper::run`] flushes by default
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(5);

/// Largest batch sent in one request by default
pub const DEFAULT_MAX_BATCH: usize = 1000;

#[derive(Clone)]
pub struct LogShipper {
    sink: Arc<dyn LogSink>,
    queue: Arc<Mutex<VecDeque<LogRecord>>>,
    max_batch: usize,
}

impl LogShipper {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_max_batch(sink, DEFAULT_MAX_BATCH)
    }

    pub fn with_max_batch(sink: Arc<dyn LogSink>, max_batch: usize) -> Self {
        Self {
            sink,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_batch: max_batch.max(1),
        }
    }

    /// Queue one line for shipping
    pub async fn push(
        &self,
        job_id: impl Into<JobId>,
        step_id: impl Into<String>,
        line_number: u64,
        output: impl Into<String>,
    ) {
        self.push_record(LogRecord::new(job_id, step_id, line_number, output))
            .await;
    }

    pub async fn push_record(&self, record: LogRecord) {
        self.queue.lock().await.push_back(record);
    }

    /// Number of lines waiting to be sent
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn setup_consumer_groups(&self, job_id: &JobId) -> Result<SetupReport> {
        self.sink.setup_consumer_groups(job_id).await
    }

    /// Send one batch from the front of the queue
    ///
    /// On a transport or 5xx error the whole batch is put back. A 4xx answer
    /// means the server will refuse the same batch again, so it is dropped.
    /// When the server answers with a report, lines that failed transiently or
    /// were not attempted are put back; rejected and permanently failed lines
    /// are dropped since resending cannot fix them.
    pub async fn flush(&self) -> Result<AppendReport> {
        let batch: Vec<LogRecord> = {
            let mut queue = self.queue.lock().await;
            let take = queue.len().min(self.max_batch);
            queue.drain(..take).collect()
        };

        if batch.is_empty() {
            return Ok(AppendReport::empty());
        }

        let report = match self.sink.send_logs(batch.clone()).await {
            Ok(report) => report,
            Err(e) if e.is_retryable() => {
                tracing::warn!("Failed to send {} log lines, requeueing: {}", batch.len(), e);
                self.requeue_front(batch).await;
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Server refused {} log lines, dropping them: {}", batch.len(), e);
                return Err(e);
            }
        };

        for rejected in &report.rejected {
            tracing::warn!(
                "Server rejected log line {} of batch: {}",
                rejected.index,
                rejected.reason
            );
        }

        for failed in report.failed.iter().filter(|f| !f.retryable) {
            tracing::error!(
                "Server could not store log line {} of batch, dropping it: {}",
                failed.index,
                failed.reason
            );
        }

        let retry: HashSet<usize> = report.retryable().map(|f| f.index).collect();
        if !retry.is_empty() {
            tracing::warn!("Requeueing {} log lines the server did not append", retry.len());
            let again = batch
                .into_iter()
                .enumerate()
                .filter(|(index, _)| retry.contains(index))
                .map(|(_, record)| record)
                .collect();
            self.requeue_front(again).await;
        }

        Ok(report)
    }

    /// Flush until the queue is empty or a flush makes no progress
    pub async fn drain(&self) -> Result<()> {
        while self.pending().await > 0 {
            let report = self.flush().await?;
            if report.retryable().count() == report.received {
                break;
            }
        }

        Ok(())
    }

    /// Flush every `interval` until `shutdown` resolves, then drain
    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        tracing::debug!("Periodic log flush failed: {}", e);
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        if let Err(e) = self.drain().await {
            tracing::error!(
                "Failed to ship {} remaining log lines: {}",
                self.pending().await,
                e
            );
        }
    }

    async fn requeue_front(&self, records: Vec<LogRecord>) {
        let mut queue = self.queue.lock().await;
        for record in records.into_iter().rev() {
            queue.push_front(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use runlog_core::domain::stream::Offset;
    use runlog_core::dto::log::{AppendedRecord, RecordFailure};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every batch; fails the first `fail_first` sends, and reports
    /// lines whose output is "flaky" as failed once
    #[derive(Default)]
    struct RecordingSink {
        batches: std::sync::Mutex<Vec<Vec<String>>>,
        fail_first: AtomicUsize,
        flaky_seen: AtomicUsize,
    }

    #[async_trait]
    impl LogSink for RecordingSink {
        async fn send_logs(&self, records: Vec<LogRecord>) -> Result<AppendReport> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(ClientError::api_error(503, "unavailable"));
            }

            self.batches
                .lock()
                .unwrap()
                .push(records.iter().map(|r| r.output.clone()).collect());

            let mut report = AppendReport {
                received: records.len(),
                ..AppendReport::default()
            };
            for (index, record) in records.into_iter().enumerate() {
                if record.output == "flaky" && self.flaky_seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    report.failed.push(
                        RecordFailure::for_record(index, &record, "store unavailable")
                            .with_retryable(true),
                    );
                } else {
                    report.appended.push(AppendedRecord {
                        index,
                        job_id: record.job_id,
                        step_id: record.step_id,
                        line_number: record.line_number,
                        offset: Offset::new(index as u64 + 1),
                    });
                }
            }
            Ok(report)
        }

        async fn setup_consumer_groups(&self, job_id: &JobId) -> Result<SetupReport> {
            Ok(SetupReport::new(job_id.clone()))
        }
    }

    #[tokio::test]
    async fn test_flush_respects_max_batch() {
        let sink = Arc::new(RecordingSink::default());
        let shipper = LogShipper::with_max_batch(sink.clone(), 2);
        for n in 1..=3 {
            shipper.push(7, "plan", n, format!("line {}", n)).await;
        }

        shipper.flush().await.unwrap();
        assert_eq!(shipper.pending().await, 1);

        shipper.drain().await.unwrap();
        let batches = sink.batches.lock().unwrap().clone();
        assert_eq!(
            batches,
            vec![
                vec!["line 1".to_string(), "line 2".to_string()],
                vec!["line 3".to_string()]
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_batch_goes_back_to_the_front() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_first.store(1, Ordering::SeqCst);
        let shipper = LogShipper::with_max_batch(sink.clone(), 2);
        shipper.push(7, "plan", 1, "a").await;
        shipper.push(7, "plan", 2, "b").await;

        assert!(shipper.flush().await.is_err());

        // pushed while the failed batch was out
        shipper.push(7, "plan", 3, "c").await;
        assert_eq!(shipper.pending().await, 3);

        shipper.drain().await.unwrap();
        let sent: Vec<String> = sink.batches.lock().unwrap().concat();
        assert_eq!(sent, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_lines_not_appended_are_retried_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let shipper = LogShipper::new(sink.clone());
        shipper.push(7, "plan", 1, "ok").await;
        shipper.push(7, "plan", 2, "flaky").await;

        let report = shipper.flush().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(shipper.pending().await, 1);

        shipper.flush().await.unwrap();
        assert_eq!(shipper.pending().await, 0);

        let batches = sink.batches.lock().unwrap().clone();
        assert_eq!(batches[1], vec!["flaky".to_string()]);
    }

    /// Refuses every batch with a client error
    #[derive(Default)]
    struct RefusingSink {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl LogSink for RefusingSink {
        async fn send_logs(&self, _records: Vec<LogRecord>) -> Result<AppendReport> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::api_error(
                400,
                "Too many log entries in batch: 2 (max: 1)",
            ))
        }

        async fn setup_consumer_groups(&self, job_id: &JobId) -> Result<SetupReport> {
            Ok(SetupReport::new(job_id.clone()))
        }
    }

    #[tokio::test]
    async fn test_refused_batch_is_dropped_instead_of_blocking_the_queue() {
        let sink = Arc::new(RefusingSink::default());
        let shipper = LogShipper::new(sink.clone());
        shipper.push(7, "plan", 1, "refused").await;

        let err = shipper.flush().await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(shipper.pending().await, 0);

        shipper.push(7, "plan", 2, "next").await;
        assert!(shipper.flush().await.is_err());
        assert_eq!(shipper.pending().await, 0);
        assert_eq!(sink.sends.load(Ordering::SeqCst), 2);
    }

    /// Fails every line permanently
    struct BrokenStoreSink;

    #[async_trait]
    impl LogSink for BrokenStoreSink {
        async fn send_logs(&self, records: Vec<LogRecord>) -> Result<AppendReport> {
            let mut report = AppendReport {
                received: records.len(),
                ..AppendReport::default()
            };
            for (index, record) in records.iter().enumerate() {
                report
                    .failed
                    .push(RecordFailure::for_record(index, record, "value too long"));
            }
            Ok(report)
        }

        async fn setup_consumer_groups(&self, job_id: &JobId) -> Result<SetupReport> {
            Ok(SetupReport::new(job_id.clone()))
        }
    }

    #[tokio::test]
    async fn test_permanently_failed_lines_are_not_resent() {
        let shipper = LogShipper::new(Arc::new(BrokenStoreSink));
        shipper.push(7, "plan", 1, "unstorable").await;

        let report = shipper.flush().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(shipper.pending().await, 0);
    }

    #[tokio::test]
    async fn test_run_drains_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let shipper = LogShipper::new(sink.clone());
        shipper.push(7, "apply", 1, "done").await;

        shipper
            .run(Duration::from_secs(3600), async {})
            .await;

        assert_eq!(shipper.pending().await, 0);
        assert_eq!(sink.batches.lock().unwrap().concat(), vec!["done"]);
    }
}
