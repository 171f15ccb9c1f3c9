//! Store wrapper for service tests: counts calls and injects failures

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use runlog_core::domain::group::{ConsumerId, GroupName, GroupStart};
use runlog_core::domain::job::StreamKey;
use runlog_core::domain::log::LogRecord;
use runlog_core::domain::stream::{DeliveredEntry, Offset, StreamEntry};
use runlog_core::dto::group::{GroupInfo, PendingSummary};
use runlog_core::dto::stream::StreamInfo;

use super::{GroupCreation, MemoryStreamStore, Result, StoreError, StreamStore};

#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStreamStore,
    calls: AtomicUsize,
    /// Failing lines, mapped to whether the failure is transient
    failing_appends: Mutex<HashMap<(StreamKey, String, u64), bool>>,
    failing_groups: Mutex<HashSet<GroupName>>,
    failing_streams: Mutex<HashSet<StreamKey>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Appends of this exact line fail as unavailable
    pub fn fail_append(&self, record: &LogRecord) {
        self.inject_append_failure(record, true);
    }

    /// Appends of this exact line fail with a backend error
    pub fn fail_append_permanently(&self, record: &LogRecord) {
        self.inject_append_failure(record, false);
    }

    fn inject_append_failure(&self, record: &LogRecord, transient: bool) {
        self.failing_appends.lock().unwrap().insert(
            (
                record.stream_key(),
                record.step_id.clone(),
                record.line_number,
            ),
            transient,
        );
    }

    pub fn fail_group(&self, group: GroupName) {
        self.failing_groups.lock().unwrap().insert(group);
    }

    pub fn fail_ensure_stream(&self, key: StreamKey) {
        self.failing_streams.lock().unwrap().insert(key);
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamStore for FaultyStore {
    async fn append(&self, key: &StreamKey, record: &LogRecord) -> Result<Offset> {
        self.record_call();
        let failing = self
            .failing_appends
            .lock()
            .unwrap()
            .get(&(key.clone(), record.step_id.clone(), record.line_number))
            .copied();
        match failing {
            Some(true) => {
                return Err(StoreError::Unavailable("injected append failure".to_string()));
            }
            Some(false) => {
                return Err(StoreError::Backend("injected append failure".to_string()));
            }
            None => {}
        }
        self.inner.append(key, record).await
    }

    async fn ensure_stream(&self, key: &StreamKey) -> Result<bool> {
        self.record_call();
        if self.failing_streams.lock().unwrap().contains(key) {
            return Err(StoreError::Unavailable("injected stream failure".to_string()));
        }
        self.inner.ensure_stream(key).await
    }

    async fn create_group(
        &self,
        key: &StreamKey,
        group: &GroupName,
        start: GroupStart,
    ) -> Result<GroupCreation> {
        self.record_call();
        if self.failing_groups.lock().unwrap().contains(group) {
            return Err(StoreError::Backend("injected group failure".to_string()));
        }
        self.inner.create_group(key, group, start).await
    }

    async fn read_new(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        self.record_call();
        self.inner.read_new(key, group, consumer, count).await
    }

    async fn read_own_pending(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        self.record_call();
        self.inner.read_own_pending(key, group, consumer, count).await
    }

    async fn claim_idle(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        self.record_call();
        self.inner.claim_idle(key, group, consumer, min_idle, count).await
    }

    async fn ack(&self, key: &StreamKey, group: &GroupName, offsets: &[Offset]) -> Result<u64> {
        self.record_call();
        self.inner.ack(key, group, offsets).await
    }

    async fn pending_summary(&self, key: &StreamKey, group: &GroupName) -> Result<PendingSummary> {
        self.record_call();
        self.inner.pending_summary(key, group).await
    }

    async fn groups(&self, key: &StreamKey) -> Result<Vec<GroupInfo>> {
        self.record_call();
        self.inner.groups(key).await
    }

    async fn range(&self, key: &StreamKey, after: Offset, count: usize) -> Result<Vec<StreamEntry>> {
        self.record_call();
        self.inner.range(key, after, count).await
    }

    async fn stream_info(&self, key: &StreamKey) -> Result<Option<StreamInfo>> {
        self.record_call();
        self.inner.stream_info(key).await
    }
}
