//! Stream Store
//!
//! Durable, ordered, per-job log streams with consumer-group cursors.
//!
//! The [`StreamStore`] trait is the single place where stream state lives:
//! services never cache entries or cursors, every read goes to the store.
//! Backends are responsible for their own per-key locking.

mod memory;
mod postgres;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStreamStore;
pub use postgres::PgStreamStore;

use std::time::Duration;

use async_trait::async_trait;
use runlog_core::domain::group::{ConsumerId, GroupName, GroupStart};
use runlog_core::domain::job::StreamKey;
use runlog_core::domain::log::LogRecord;
use runlog_core::domain::stream::{DeliveredEntry, Offset, StreamEntry};
use runlog_core::dto::group::{GroupInfo, PendingSummary};
use runlog_core::dto::stream::StreamInfo;
use thiserror::Error;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("consumer group {group} does not exist on stream {key}")]
    GroupNotFound { key: StreamKey, group: GroupName },

    /// The backend could not be reached; the operation may be retried
    #[error("stream store unavailable: {0}")]
    Unavailable(String),

    #[error("stream store error: {0}")]
    Backend(String),

    #[error("corrupt stream data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn group_not_found(key: &StreamKey, group: &GroupName) -> Self {
        Self::GroupNotFound {
            key: key.clone(),
            group: group.clone(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of a group creation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCreation {
    Created,
    AlreadyExists,
}

/// Append-only, ordered log streams keyed by job, with consumer groups
///
/// Delivery through a group is at-least-once: an entry handed to a consumer
/// stays pending for that group until acknowledged, and pending entries can be
/// redelivered to the same consumer or reclaimed by another one.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Append one record and return its offset
    ///
    /// Creates the stream on first append.
    async fn append(&self, key: &StreamKey, record: &LogRecord) -> Result<Offset>;

    /// Create the stream if it does not exist yet
    ///
    /// # Returns
    /// `true` when the stream was created by this call
    async fn ensure_stream(&self, key: &StreamKey) -> Result<bool>;

    /// Create a consumer group, creating the stream too when needed
    ///
    /// An existing group is left untouched and reported as
    /// [`GroupCreation::AlreadyExists`].
    async fn create_group(
        &self,
        key: &StreamKey,
        group: &GroupName,
        start: GroupStart,
    ) -> Result<GroupCreation>;

    /// Deliver up to `count` entries the group has not handed out yet
    ///
    /// Entries come back in stream order and become pending for `consumer`.
    async fn read_new(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>>;

    /// Redeliver entries still pending for `consumer`, oldest first
    async fn read_own_pending(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>>;

    /// Transfer pending entries idle for at least `min_idle` to `consumer`
    ///
    /// Entries may belong to any consumer of the group, including `consumer`.
    async fn claim_idle(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>>;

    /// Acknowledge delivered entries
    ///
    /// # Returns
    /// How many of `offsets` were pending; the rest are ignored
    async fn ack(&self, key: &StreamKey, group: &GroupName, offsets: &[Offset]) -> Result<u64>;

    async fn pending_summary(&self, key: &StreamKey, group: &GroupName) -> Result<PendingSummary>;

    /// All groups of a stream, ordered by name (empty for unknown streams)
    async fn groups(&self, key: &StreamKey) -> Result<Vec<GroupInfo>>;

    /// Group-independent replay of entries after `after`
    async fn range(&self, key: &StreamKey, after: Offset, count: usize)
    -> Result<Vec<StreamEntry>>;

    async fn stream_info(&self, key: &StreamKey) -> Result<Option<StreamInfo>>;
}
