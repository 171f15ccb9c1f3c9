//! In-memory stream store
//!
//! Keeps every stream behind its own lock so appends and reads on different
//! jobs never contend. Nothing survives a restart; used for development and
//! tests, and as the reference behaviour for other backends.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runlog_core::domain::group::{ConsumerId, GroupName, GroupStart};
use runlog_core::domain::job::StreamKey;
use runlog_core::domain::log::LogRecord;
use runlog_core::domain::stream::{DeliveredEntry, Offset, StreamEntry};
use runlog_core::dto::group::{ConsumerPending, GroupInfo, PendingSummary};
use runlog_core::dto::stream::StreamInfo;

use super::{GroupCreation, Result, StoreError, StreamStore};

#[derive(Debug)]
struct PendingEntry {
    consumer: ConsumerId,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct GroupState {
    last_delivered: Offset,
    pending: BTreeMap<Offset, PendingEntry>,
}

impl GroupState {
    fn acked_through(&self) -> Offset {
        match self.pending.keys().next() {
            Some(lowest) => Offset::new(lowest.get() - 1),
            None => self.last_delivered,
        }
    }
}

#[derive(Debug)]
struct StreamState {
    // entries[i] has offset i + 1
    entries: Vec<StreamEntry>,
    groups: BTreeMap<GroupName, GroupState>,
    created_at: DateTime<Utc>,
}

impl StreamState {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            groups: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    fn last_offset(&self) -> Offset {
        Offset::new(self.entries.len() as u64)
    }

    fn entry(entries: &[StreamEntry], offset: Offset) -> Result<&StreamEntry> {
        offset
            .get()
            .checked_sub(1)
            .and_then(|i| entries.get(i as usize))
            .ok_or_else(|| StoreError::Corrupt(format!("pending offset {} has no entry", offset)))
    }
}

type SharedStream = Arc<Mutex<StreamState>>;

/// In-memory implementation of [`StreamStore`]
#[derive(Clone, Default)]
pub struct MemoryStreamStore {
    streams: Arc<RwLock<HashMap<StreamKey, SharedStream>>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, key: &StreamKey) -> Result<Option<SharedStream>> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams.get(key).cloned())
    }

    fn find_or_create(&self, key: &StreamKey) -> Result<(SharedStream, bool)> {
        if let Some(stream) = self.find(key)? {
            return Ok((stream, false));
        }

        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        let mut created = false;
        let stream = streams
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(StreamState::new()))
            })
            .clone();

        Ok((stream, created))
    }

    /// Run `f` against one group of a stream while holding the stream lock
    fn with_group<T>(
        &self,
        key: &StreamKey,
        group: &GroupName,
        f: impl FnOnce(&[StreamEntry], &mut GroupState) -> Result<T>,
    ) -> Result<T> {
        let stream = self
            .find(key)?
            .ok_or_else(|| StoreError::group_not_found(key, group))?;
        let mut state = lock(&stream)?;
        let StreamState {
            entries, groups, ..
        } = &mut *state;

        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| StoreError::group_not_found(key, group))?;

        f(entries, group_state)
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

fn lock(stream: &SharedStream) -> Result<MutexGuard<'_, StreamState>> {
    stream.lock().map_err(|_| poisoned())
}

/// Redeliver the pending entries at `offsets` to `consumer`
fn redeliver(
    entries: &[StreamEntry],
    group: &mut GroupState,
    offsets: Vec<Offset>,
    consumer: &ConsumerId,
) -> Result<Vec<DeliveredEntry>> {
    let now = Instant::now();
    let mut delivered = Vec::with_capacity(offsets.len());

    for offset in offsets {
        let entry = StreamState::entry(entries, offset)?;
        if let Some(pending) = group.pending.get_mut(&offset) {
            pending.consumer = consumer.clone();
            pending.delivered_at = now;
            pending.delivery_count += 1;
            delivered.push(DeliveredEntry::from_entry(
                entry.clone(),
                pending.delivery_count,
            ));
        }
    }

    Ok(delivered)
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn append(&self, key: &StreamKey, record: &LogRecord) -> Result<Offset> {
        let (stream, _) = self.find_or_create(key)?;
        let mut state = lock(&stream)?;

        let offset = state.last_offset().next();
        state.entries.push(StreamEntry {
            offset,
            record: record.clone(),
            appended_at: Utc::now(),
        });

        Ok(offset)
    }

    async fn ensure_stream(&self, key: &StreamKey) -> Result<bool> {
        let (_, created) = self.find_or_create(key)?;
        Ok(created)
    }

    async fn create_group(
        &self,
        key: &StreamKey,
        group: &GroupName,
        start: GroupStart,
    ) -> Result<GroupCreation> {
        let (stream, _) = self.find_or_create(key)?;
        let mut state = lock(&stream)?;

        if state.groups.contains_key(group) {
            tracing::debug!("Consumer group {} already exists on stream {}", group, key);
            return Ok(GroupCreation::AlreadyExists);
        }

        let last_delivered = match start {
            GroupStart::Latest => state.last_offset(),
            GroupStart::Beginning => Offset::ZERO,
        };

        state.groups.insert(
            group.clone(),
            GroupState {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );

        Ok(GroupCreation::Created)
    }

    async fn read_new(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        self.with_group(key, group, |entries, group_state| {
            let now = Instant::now();
            let start = group_state.last_delivered.get() as usize;

            let delivered: Vec<DeliveredEntry> = entries
                .iter()
                .skip(start)
                .take(count)
                .map(|entry| DeliveredEntry::from_entry(entry.clone(), 1))
                .collect();

            for entry in &delivered {
                group_state.pending.insert(
                    entry.offset,
                    PendingEntry {
                        consumer: consumer.clone(),
                        delivered_at: now,
                        delivery_count: 1,
                    },
                );
                group_state.last_delivered = entry.offset;
            }

            Ok(delivered)
        })
    }

    async fn read_own_pending(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        self.with_group(key, group, |entries, group_state| {
            let offsets: Vec<Offset> = group_state
                .pending
                .iter()
                .filter(|(_, p)| &p.consumer == consumer)
                .map(|(offset, _)| *offset)
                .take(count)
                .collect();

            redeliver(entries, group_state, offsets, consumer)
        })
    }

    async fn claim_idle(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        self.with_group(key, group, |entries, group_state| {
            let offsets: Vec<Offset> = group_state
                .pending
                .iter()
                .filter(|(_, p)| p.delivered_at.elapsed() >= min_idle)
                .map(|(offset, _)| *offset)
                .take(count)
                .collect();

            let claimed = redeliver(entries, group_state, offsets, consumer)?;
            if !claimed.is_empty() {
                tracing::debug!(
                    "Consumer {} reclaimed {} idle entries on {}/{}",
                    consumer,
                    claimed.len(),
                    key,
                    group
                );
            }

            Ok(claimed)
        })
    }

    async fn ack(&self, key: &StreamKey, group: &GroupName, offsets: &[Offset]) -> Result<u64> {
        self.with_group(key, group, |_, group_state| {
            let acknowledged = offsets
                .iter()
                .filter(|offset| group_state.pending.remove(*offset).is_some())
                .count();

            Ok(acknowledged as u64)
        })
    }

    async fn pending_summary(&self, key: &StreamKey, group: &GroupName) -> Result<PendingSummary> {
        self.with_group(key, group, |_, group_state| {
            let mut per_consumer: BTreeMap<&ConsumerId, u64> = BTreeMap::new();
            for pending in group_state.pending.values() {
                *per_consumer.entry(&pending.consumer).or_default() += 1;
            }

            Ok(PendingSummary {
                count: group_state.pending.len() as u64,
                lowest: group_state.pending.keys().next().copied(),
                highest: group_state.pending.keys().next_back().copied(),
                consumers: per_consumer
                    .into_iter()
                    .map(|(consumer, pending)| ConsumerPending {
                        consumer: consumer.clone(),
                        pending,
                    })
                    .collect(),
            })
        })
    }

    async fn groups(&self, key: &StreamKey) -> Result<Vec<GroupInfo>> {
        let Some(stream) = self.find(key)? else {
            return Ok(Vec::new());
        };
        let state = lock(&stream)?;

        Ok(state
            .groups
            .iter()
            .map(|(name, group)| {
                let consumers: HashSet<&ConsumerId> =
                    group.pending.values().map(|p| &p.consumer).collect();

                GroupInfo {
                    name: name.clone(),
                    last_delivered: group.last_delivered,
                    acked_through: group.acked_through(),
                    pending: group.pending.len() as u64,
                    consumers: consumers.len() as u64,
                }
            })
            .collect())
    }

    async fn range(
        &self,
        key: &StreamKey,
        after: Offset,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let Some(stream) = self.find(key)? else {
            return Ok(Vec::new());
        };
        let state = lock(&stream)?;

        Ok(state
            .entries
            .iter()
            .skip(after.get() as usize)
            .take(count)
            .cloned()
            .collect())
    }

    async fn stream_info(&self, key: &StreamKey) -> Result<Option<StreamInfo>> {
        let Some(stream) = self.find(key)? else {
            return Ok(None);
        };
        let state = lock(&stream)?;

        Ok(Some(StreamInfo {
            key: key.clone(),
            length: state.entries.len() as u64,
            last_offset: state.last_offset(),
            created_at: state.created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlog_core::domain::job::JobId;

    fn key(job: i64) -> StreamKey {
        StreamKey::for_job(&JobId::from(job))
    }

    fn consumer(name: &str) -> ConsumerId {
        ConsumerId::parse(name).unwrap()
    }

    async fn append_lines(store: &MemoryStreamStore, job: i64, lines: &[&str]) -> Vec<Offset> {
        let mut offsets = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let record = LogRecord::new(job, "plan", i as u64 + 1, *line);
            offsets.push(store.append(&key(job), &record).await.unwrap());
        }
        offsets
    }

    #[tokio::test]
    async fn test_offsets_are_scoped_per_stream() {
        let store = MemoryStreamStore::new();

        let first = append_lines(&store, 1, &["a", "b"]).await;
        let second = append_lines(&store, 2, &["c"]).await;

        assert_eq!(first, vec![Offset::new(1), Offset::new(2)]);
        assert_eq!(second, vec![Offset::new(1)]);
    }

    #[tokio::test]
    async fn test_create_group_is_idempotent() {
        let store = MemoryStreamStore::new();
        let group = GroupName::cli();

        let first = store.create_group(&key(1), &group, GroupStart::Latest).await.unwrap();
        let second = store.create_group(&key(1), &group, GroupStart::Latest).await.unwrap();

        assert_eq!(first, GroupCreation::Created);
        assert_eq!(second, GroupCreation::AlreadyExists);
        assert_eq!(store.groups(&key(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_group_skips_earlier_entries() {
        let store = MemoryStreamStore::new();
        append_lines(&store, 1, &["before"]).await;

        store
            .create_group(&key(1), &GroupName::ui(), GroupStart::Latest)
            .await
            .unwrap();
        append_lines(&store, 1, &["after"]).await;

        let read = store
            .read_new(&key(1), &GroupName::ui(), &consumer("ui-1"), 10)
            .await
            .unwrap();

        assert_eq!(read.len(), 1);
        assert_eq!(read[0].record.output, "after");
    }

    #[tokio::test]
    async fn test_beginning_group_replays_everything() {
        let store = MemoryStreamStore::new();
        append_lines(&store, 1, &["one", "two"]).await;

        store
            .create_group(&key(1), &GroupName::ui(), GroupStart::Beginning)
            .await
            .unwrap();

        let read = store
            .read_new(&key(1), &GroupName::ui(), &consumer("ui-1"), 10)
            .await
            .unwrap();

        let outputs: Vec<&str> = read.iter().map(|e| e.record.output.as_str()).collect();
        assert_eq!(outputs, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_read_respects_count_and_advances_cursor() {
        let store = MemoryStreamStore::new();
        store
            .create_group(&key(1), &GroupName::cli(), GroupStart::Latest)
            .await
            .unwrap();
        append_lines(&store, 1, &["a", "b", "c"]).await;

        let c = consumer("cli-1");
        let first = store.read_new(&key(1), &GroupName::cli(), &c, 2).await.unwrap();
        let second = store.read_new(&key(1), &GroupName::cli(), &c, 2).await.unwrap();
        let third = store.read_new(&key(1), &GroupName::cli(), &c, 2).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].offset, Offset::new(3));
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_group_is_an_error() {
        let store = MemoryStreamStore::new();
        append_lines(&store, 1, &["a"]).await;

        let result = store
            .read_new(&key(1), &GroupName::cli(), &consumer("cli-1"), 10)
            .await;

        assert!(matches!(result, Err(StoreError::GroupNotFound { .. })));
    }

    #[tokio::test]
    async fn test_ack_advances_low_water_mark_when_contiguous() {
        let store = MemoryStreamStore::new();
        let group = GroupName::cli();
        store.create_group(&key(1), &group, GroupStart::Latest).await.unwrap();
        append_lines(&store, 1, &["a", "b", "c"]).await;
        store.read_new(&key(1), &group, &consumer("cli-1"), 10).await.unwrap();

        // Acking 2 leaves a gap at 1
        let acked = store.ack(&key(1), &group, &[Offset::new(2)]).await.unwrap();
        assert_eq!(acked, 1);
        assert_eq!(store.groups(&key(1)).await.unwrap()[0].acked_through, Offset::ZERO);

        let acked = store
            .ack(&key(1), &group, &[Offset::new(1), Offset::new(2)])
            .await
            .unwrap();
        assert_eq!(acked, 1);

        let info = &store.groups(&key(1)).await.unwrap()[0];
        assert_eq!(info.acked_through, Offset::new(2));
        assert_eq!(info.pending, 1);
    }

    #[tokio::test]
    async fn test_read_own_pending_redelivers_unacked_entries() {
        let store = MemoryStreamStore::new();
        let group = GroupName::cli();
        let c = consumer("cli-1");
        store.create_group(&key(1), &group, GroupStart::Latest).await.unwrap();
        append_lines(&store, 1, &["a", "b"]).await;

        store.read_new(&key(1), &group, &c, 10).await.unwrap();
        store.ack(&key(1), &group, &[Offset::new(1)]).await.unwrap();

        let again = store.read_own_pending(&key(1), &group, &c, 10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].offset, Offset::new(2));
        assert_eq!(again[0].delivery_count, 2);

        let other = store
            .read_own_pending(&key(1), &group, &consumer("cli-2"), 10)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_claim_idle_moves_entries_between_consumers() {
        let store = MemoryStreamStore::new();
        let group = GroupName::ui();
        store.create_group(&key(1), &group, GroupStart::Latest).await.unwrap();
        append_lines(&store, 1, &["a", "b"]).await;
        store.read_new(&key(1), &group, &consumer("ui-1"), 10).await.unwrap();

        let not_idle = store
            .claim_idle(&key(1), &group, &consumer("ui-2"), Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(not_idle.is_empty());

        let claimed = store
            .claim_idle(&key(1), &group, &consumer("ui-2"), Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);
        assert!(claimed.iter().all(|e| e.delivery_count == 2));

        let summary = store.pending_summary(&key(1), &group).await.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.consumers.len(), 1);
        assert_eq!(summary.consumers[0].consumer.as_str(), "ui-2");
        assert_eq!(summary.lowest, Some(Offset::new(1)));
        assert_eq!(summary.highest, Some(Offset::new(2)));
    }

    #[tokio::test]
    async fn test_range_and_stream_info() {
        let store = MemoryStreamStore::new();
        append_lines(&store, 1, &["a", "b", "c"]).await;

        let tail = store.range(&key(1), Offset::new(1), 10).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].offset, Offset::new(2));

        let info = store.stream_info(&key(1)).await.unwrap().unwrap();
        assert_eq!(info.length, 3);
        assert_eq!(info.last_offset, Offset::new(3));

        assert!(store.stream_info(&key(2)).await.unwrap().is_none());
        assert!(store.range(&key(2), Offset::ZERO, 10).await.unwrap().is_empty());
    }
}
