//! Log Reader
//!
//! Consumer-side access to job streams: group reads with reclaim of stale
//! pending entries, acknowledgement, inspection and plain replay.

use std::sync::Arc;
use std::time::Duration;

use runlog_core::domain::group::{ConsumerId, GroupName};
use runlog_core::domain::job::{JobId, StreamKey};
use runlog_core::domain::stream::{DeliveredEntry, Offset};
use runlog_core::dto::group::{GroupInfo, PendingSummary};
use runlog_core::dto::stream::{ReplayResponse, StreamInfo};
use tokio::time::Instant;

use crate::store::{Result, StreamStore};

#[derive(Debug, Clone, Copy)]
pub struct ReaderSettings {
    /// Minimum idle time before a pending entry is reclaimed by another consumer
    pub pending_timeout: Duration,
    pub default_count: usize,
    pub max_count: usize,
    pub poll_interval: Duration,
    pub max_block: Duration,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_secs(60),
            default_count: 100,
            max_count: 1000,
            poll_interval: Duration::from_millis(200),
            max_block: Duration::from_secs(30),
        }
    }
}

impl ReaderSettings {
    fn count(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_count)
            .clamp(1, self.max_count)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    pub count: Option<usize>,
    /// Wait up to this long for entries when none are available
    pub block: Option<Duration>,
    /// Redeliver this consumer's own unacknowledged entries first
    pub resume: bool,
}

#[derive(Clone)]
pub struct LogReader {
    store: Arc<dyn StreamStore>,
    settings: ReaderSettings,
}

impl LogReader {
    pub fn new(store: Arc<dyn StreamStore>, settings: ReaderSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Read entries for `consumer` through `group`
    ///
    /// Sources, in order: the consumer's own pending entries (when resuming),
    /// entries left pending by any consumer for longer than the pending
    /// timeout, then entries the group has never delivered. An empty result is
    /// not an error; with `block` set the store is polled until something
    /// arrives or the (capped) block time runs out.
    pub async fn read(
        &self,
        job_id: &JobId,
        group: &GroupName,
        consumer: &ConsumerId,
        options: ReadOptions,
    ) -> Result<Vec<DeliveredEntry>> {
        let key = StreamKey::for_job(job_id);
        let count = self.settings.count(options.count);
        let deadline = options
            .block
            .map(|block| Instant::now() + block.min(self.settings.max_block));
        let mut resume = options.resume;

        loop {
            let entries = self.poll(&key, group, consumer, count, resume).await?;
            resume = false;

            if !entries.is_empty() {
                return Ok(entries);
            }

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::ZERO,
            };
            if remaining.is_zero() {
                return Ok(entries);
            }

            tokio::time::sleep(self.settings.poll_interval.min(remaining)).await;
        }
    }

    async fn poll(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
        resume: bool,
    ) -> Result<Vec<DeliveredEntry>> {
        let mut entries = Vec::new();

        if resume {
            entries.extend(self.store.read_own_pending(key, group, consumer, count).await?);
        }

        if entries.len() < count {
            let claimed = self
                .store
                .claim_idle(
                    key,
                    group,
                    consumer,
                    self.settings.pending_timeout,
                    count - entries.len(),
                )
                .await?;
            if !claimed.is_empty() {
                tracing::info!(
                    "Consumer {} reclaimed {} stale entries from {}/{}",
                    consumer,
                    claimed.len(),
                    key,
                    group
                );
            }
            entries.extend(claimed);
        }

        if entries.len() < count {
            entries.extend(
                self.store
                    .read_new(key, group, consumer, count - entries.len())
                    .await?,
            );
        }

        entries.sort_by_key(|entry| entry.offset);
        entries.dedup_by_key(|entry| entry.offset);

        Ok(entries)
    }

    pub async fn ack(&self, job_id: &JobId, group: &GroupName, offsets: &[Offset]) -> Result<u64> {
        if offsets.is_empty() {
            return Ok(0);
        }

        let acknowledged = self
            .store
            .ack(&StreamKey::for_job(job_id), group, offsets)
            .await?;

        tracing::debug!(
            "Acknowledged {} of {} entries for job {} group {}",
            acknowledged,
            offsets.len(),
            job_id,
            group
        );

        Ok(acknowledged)
    }

    /// Take over entries pending for at least `min_idle`
    pub async fn claim(
        &self,
        job_id: &JobId,
        group: &GroupName,
        consumer: &ConsumerId,
        min_idle: Duration,
        count: Option<usize>,
    ) -> Result<Vec<DeliveredEntry>> {
        self.store
            .claim_idle(
                &StreamKey::for_job(job_id),
                group,
                consumer,
                min_idle,
                self.settings.count(count),
            )
            .await
    }

    pub async fn pending(&self, job_id: &JobId, group: &GroupName) -> Result<PendingSummary> {
        self.store
            .pending_summary(&StreamKey::for_job(job_id), group)
            .await
    }

    pub async fn groups(&self, job_id: &JobId) -> Result<Vec<GroupInfo>> {
        self.store.groups(&StreamKey::for_job(job_id)).await
    }

    /// Group-independent replay of entries after `after`
    pub async fn replay(
        &self,
        job_id: &JobId,
        after: Offset,
        count: Option<usize>,
    ) -> Result<ReplayResponse> {
        let entries = self
            .store
            .range(&StreamKey::for_job(job_id), after, self.settings.count(count))
            .await?;
        let next_after = entries.last().map(|e| e.offset).unwrap_or(after);

        Ok(ReplayResponse {
            entries,
            next_after,
        })
    }

    pub async fn stream_info(&self, job_id: &JobId) -> Result<Option<StreamInfo>> {
        self.store.stream_info(&StreamKey::for_job(job_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStreamStore, StoreError};
    use runlog_core::domain::group::GroupStart;
    use runlog_core::domain::log::LogRecord;

    const JOB: i64 = 7;

    fn consumer(name: &str) -> ConsumerId {
        ConsumerId::parse(name).unwrap()
    }

    async fn setup(settings: ReaderSettings) -> (Arc<MemoryStreamStore>, LogReader) {
        let store = Arc::new(MemoryStreamStore::new());
        let key = StreamKey::for_job(&JobId::from(JOB));
        for group in GroupName::defaults() {
            store
                .create_group(&key, &group, GroupStart::Latest)
                .await
                .unwrap();
        }
        let reader = LogReader::new(store.clone(), settings);
        (store, reader)
    }

    async fn append(store: &MemoryStreamStore, outputs: &[&str]) {
        for (i, output) in outputs.iter().enumerate() {
            let record = LogRecord::new(JOB, "plan", i as u64 + 1, *output);
            store.append(&record.stream_key(), &record).await.unwrap();
        }
    }

    fn outputs(entries: &[DeliveredEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.record.output.as_str()).collect()
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let (store, reader) = setup(ReaderSettings::default()).await;
        append(&store, &["r1", "r2"]).await;
        let job = JobId::from(JOB);

        let cli = reader
            .read(&job, &GroupName::cli(), &consumer("cli-1"), ReadOptions {
                count: Some(1),
                ..ReadOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(outputs(&cli), vec!["r1"]);
        assert_eq!(reader.ack(&job, &GroupName::cli(), &[cli[0].offset]).await.unwrap(), 1);

        let ui = reader
            .read(&job, &GroupName::ui(), &consumer("ui-1"), ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(outputs(&ui), vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_unacked_entries_come_back_on_resume() {
        let (store, reader) = setup(ReaderSettings::default()).await;
        append(&store, &["r1", "r2"]).await;
        let job = JobId::from(JOB);
        let cli = consumer("cli-1");

        let first = reader
            .read(&job, &GroupName::cli(), &cli, ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        // consumer crashed before acknowledging; a plain read sees nothing new
        let plain = reader
            .read(&job, &GroupName::cli(), &cli, ReadOptions::default())
            .await
            .unwrap();
        assert!(plain.is_empty());

        let resumed = reader
            .read(&job, &GroupName::cli(), &cli, ReadOptions {
                resume: true,
                ..ReadOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(outputs(&resumed), vec!["r1", "r2"]);
        assert!(resumed.iter().all(DeliveredEntry::is_redelivery));
    }

    #[tokio::test]
    async fn test_stale_entries_are_reclaimed_by_another_consumer() {
        let (store, reader) = setup(ReaderSettings {
            pending_timeout: Duration::ZERO,
            ..ReaderSettings::default()
        })
        .await;
        append(&store, &["r1"]).await;
        let job = JobId::from(JOB);

        let crashed = reader
            .read(&job, &GroupName::ui(), &consumer("ui-a"), ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(crashed.len(), 1);

        let reclaimed = reader
            .read(&job, &GroupName::ui(), &consumer("ui-b"), ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(outputs(&reclaimed), vec!["r1"]);
        assert_eq!(reclaimed[0].delivery_count, 2);

        let pending = reader.pending(&job, &GroupName::ui()).await.unwrap();
        assert_eq!(pending.count, 1);
        assert_eq!(pending.consumers[0].consumer.as_str(), "ui-b");
    }

    #[tokio::test]
    async fn test_count_is_capped() {
        let (store, reader) = setup(ReaderSettings {
            max_count: 2,
            ..ReaderSettings::default()
        })
        .await;
        append(&store, &["a", "b", "c"]).await;

        let entries = reader
            .read(&JobId::from(JOB), &GroupName::cli(), &consumer("c"), ReadOptions {
                count: Some(50),
                ..ReadOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_blocking_read_times_out_empty() {
        let (_store, reader) = setup(ReaderSettings {
            poll_interval: Duration::from_millis(10),
            ..ReaderSettings::default()
        })
        .await;

        let started = std::time::Instant::now();
        let entries = reader
            .read(&JobId::from(JOB), &GroupName::cli(), &consumer("c"), ReadOptions {
                block: Some(Duration::from_millis(50)),
                ..ReadOptions::default()
            })
            .await
            .unwrap();

        assert!(entries.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_blocking_read_wakes_up_on_append() {
        let (store, reader) = setup(ReaderSettings {
            poll_interval: Duration::from_millis(10),
            ..ReaderSettings::default()
        })
        .await;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                append(&store, &["late"]).await;
            })
        };

        let entries = reader
            .read(&JobId::from(JOB), &GroupName::cli(), &consumer("c"), ReadOptions {
                block: Some(Duration::from_secs(5)),
                ..ReadOptions::default()
            })
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(outputs(&entries), vec!["late"]);
    }

    #[tokio::test]
    async fn test_read_on_missing_group_is_an_error() {
        let (_store, reader) = setup(ReaderSettings::default()).await;
        let audit = GroupName::parse("audit").unwrap();

        let result = reader
            .read(&JobId::from(JOB), &audit, &consumer("c"), ReadOptions::default())
            .await;

        assert!(matches!(result, Err(StoreError::GroupNotFound { .. })));
    }

    #[tokio::test]
    async fn test_replay_pages_through_the_stream() {
        let (store, reader) = setup(ReaderSettings::default()).await;
        append(&store, &["a", "b", "c"]).await;
        let job = JobId::from(JOB);

        let page = reader.replay(&job, Offset::ZERO, Some(2)).await.unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.next_after, Offset::new(2));

        let rest = reader.replay(&job, page.next_after, Some(2)).await.unwrap();
        assert_eq!(rest.entries.len(), 1);
        assert_eq!(rest.entries[0].record.output, "c");

        let done = reader.replay(&job, rest.next_after, None).await.unwrap();
        assert!(done.entries.is_empty());
        assert_eq!(done.next_after, Offset::new(3));
    }
}
