//! PostgreSQL stream store
//!
//! Streams, groups and pending entries live in four tables (see
//! [`crate::db::run_migrations`]). Every mutation runs in one transaction.
//! Appends on the same stream serialize on the `log_streams` row, and group
//! reads serialize on the `log_consumer_groups` row.

use std::time::Duration;

use async_trait::async_trait;
use runlog_core::domain::group::{ConsumerId, GroupName, GroupStart};
use runlog_core::domain::job::{JobId, StreamKey};
use runlog_core::domain::log::LogRecord;
use runlog_core::domain::stream::{DeliveredEntry, Offset, StreamEntry};
use runlog_core::dto::group::{ConsumerPending, GroupInfo, PendingSummary};
use runlog_core::dto::stream::StreamInfo;
use sqlx::{PgPool, Postgres, Transaction};

use super::{GroupCreation, Result, StoreError, StreamStore};

/// PostgreSQL implementation of [`StreamStore`]
#[derive(Clone)]
pub struct PgStreamStore {
    pool: PgPool,
}

impl PgStreamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the group row for the rest of the transaction
    async fn lock_group(
        tx: &mut Transaction<'_, Postgres>,
        key: &StreamKey,
        group: &GroupName,
    ) -> Result<Offset> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT last_delivered
            FROM log_consumer_groups
            WHERE stream_key = $1 AND group_name = $2
            FOR UPDATE
            "#,
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some((last_delivered,)) => to_offset(last_delivered),
            None => Err(StoreError::group_not_found(key, group)),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            // serialization_failure, deadlock_detected
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
            {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

fn to_offset(value: i64) -> Result<Offset> {
    u64::try_from(value)
        .map(Offset::new)
        .map_err(|_| StoreError::Corrupt(format!("negative offset {}", value)))
}

fn to_db(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::Backend(format!("{} {} out of range", what, value)))
}

fn to_limit(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct EntryRow {
    entry_offset: i64,
    job_id: String,
    step_id: String,
    line_number: i64,
    output: String,
    appended_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<EntryRow> for StreamEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self> {
        let line_number = u64::try_from(row.line_number)
            .map_err(|_| StoreError::Corrupt(format!("negative line number {}", row.line_number)))?;

        Ok(StreamEntry {
            offset: to_offset(row.entry_offset)?,
            record: LogRecord {
                job_id: JobId::new(row.job_id),
                step_id: row.step_id,
                line_number,
                output: row.output,
            },
            appended_at: row.appended_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeliveredRow {
    #[sqlx(flatten)]
    entry: EntryRow,
    delivery_count: i32,
}

impl TryFrom<DeliveredRow> for DeliveredEntry {
    type Error = StoreError;

    fn try_from(row: DeliveredRow) -> Result<Self> {
        let delivery_count = u32::try_from(row.delivery_count).map_err(|_| {
            StoreError::Corrupt(format!("negative delivery count {}", row.delivery_count))
        })?;

        Ok(DeliveredEntry::from_entry(row.entry.try_into()?, delivery_count))
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    group_name: String,
    last_delivered: i64,
    acked_through: i64,
    pending: i64,
    consumers: i64,
}

#[derive(sqlx::FromRow)]
struct ConsumerPendingRow {
    consumer_id: String,
    pending: i64,
    lowest: i64,
    highest: i64,
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl StreamStore for PgStreamStore {
    async fn append(&self, key: &StreamKey, record: &LogRecord) -> Result<Offset> {
        let mut tx = self.pool.begin().await?;

        let (offset,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO log_streams (stream_key, last_offset, created_at)
            VALUES ($1, 1, now())
            ON CONFLICT (stream_key)
            DO UPDATE SET last_offset = log_streams.last_offset + 1
            RETURNING last_offset
            "#,
        )
        .bind(key.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO log_stream_entries
                (stream_key, entry_offset, job_id, step_id, line_number, output, appended_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            "#,
        )
        .bind(key.as_str())
        .bind(offset)
        .bind(record.job_id.as_str())
        .bind(&record.step_id)
        .bind(to_db(record.line_number, "line number")?)
        .bind(&record.output)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        to_offset(offset)
    }

    async fn ensure_stream(&self, key: &StreamKey) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO log_streams (stream_key, last_offset, created_at)
            VALUES ($1, 0, now())
            ON CONFLICT (stream_key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_group(
        &self,
        key: &StreamKey,
        group: &GroupName,
        start: GroupStart,
    ) -> Result<GroupCreation> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO log_streams (stream_key, last_offset, created_at)
            VALUES ($1, 0, now())
            ON CONFLICT (stream_key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .execute(&mut *tx)
        .await?;

        // Holding the stream row pins the creation point against concurrent appends
        let (last_offset,): (i64,) = sqlx::query_as(
            "SELECT last_offset FROM log_streams WHERE stream_key = $1 FOR UPDATE",
        )
        .bind(key.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let last_delivered = match start {
            GroupStart::Latest => last_offset,
            GroupStart::Beginning => 0,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO log_consumer_groups (stream_key, group_name, last_delivered, created_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (stream_key, group_name) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .bind(last_delivered)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Consumer group {} already exists on stream {}", group, key);
            return Ok(GroupCreation::AlreadyExists);
        }

        Ok(GroupCreation::Created)
    }

    async fn read_new(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        let mut tx = self.pool.begin().await?;
        let last_delivered = Self::lock_group(&mut tx, key, group).await?;

        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT entry_offset, job_id, step_id, line_number, output, appended_at
            FROM log_stream_entries
            WHERE stream_key = $1 AND entry_offset > $2
            ORDER BY entry_offset ASC
            LIMIT $3
            "#,
        )
        .bind(key.as_str())
        .bind(to_db(last_delivered.get(), "offset")?)
        .bind(to_limit(count))
        .fetch_all(&mut *tx)
        .await?;

        let Some(newest) = rows.last().map(|row| row.entry_offset) else {
            tx.commit().await?;
            return Ok(Vec::new());
        };

        let offsets: Vec<i64> = rows.iter().map(|row| row.entry_offset).collect();

        sqlx::query(
            r#"
            INSERT INTO log_pending_entries
                (stream_key, group_name, entry_offset, consumer_id, delivered_at, delivery_count)
            SELECT $1, $2, entry_offset, $3, now(), 1
            FROM UNNEST($4::BIGINT[]) AS entry_offset
            "#,
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .bind(consumer.as_str())
        .bind(&offsets)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE log_consumer_groups
            SET last_delivered = $3
            WHERE stream_key = $1 AND group_name = $2
            "#,
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .bind(newest)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        rows.into_iter()
            .map(|row| Ok(DeliveredEntry::from_entry(row.try_into()?, 1)))
            .collect()
    }

    async fn read_own_pending(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_group(&mut tx, key, group).await?;

        let rows = sqlx::query_as::<_, DeliveredRow>(
            r#"
            WITH selected AS (
                SELECT entry_offset
                FROM log_pending_entries
                WHERE stream_key = $1 AND group_name = $2 AND consumer_id = $3
                ORDER BY entry_offset ASC
                LIMIT $4
            ),
            redelivered AS (
                UPDATE log_pending_entries p
                SET delivery_count = p.delivery_count + 1, delivered_at = now()
                FROM selected
                WHERE p.stream_key = $1 AND p.group_name = $2
                  AND p.entry_offset = selected.entry_offset
                RETURNING p.entry_offset, p.delivery_count
            )
            SELECT e.entry_offset, e.job_id, e.step_id, e.line_number, e.output,
                   e.appended_at, r.delivery_count
            FROM redelivered r
            JOIN log_stream_entries e
              ON e.stream_key = $1 AND e.entry_offset = r.entry_offset
            ORDER BY e.entry_offset ASC
            "#,
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .bind(consumer.as_str())
        .bind(to_limit(count))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        collect(rows)
    }

    async fn claim_idle(
        &self,
        key: &StreamKey,
        group: &GroupName,
        consumer: &ConsumerId,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<DeliveredEntry>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_group(&mut tx, key, group).await?;

        let rows = sqlx::query_as::<_, DeliveredRow>(
            r#"
            WITH selected AS (
                SELECT entry_offset
                FROM log_pending_entries
                WHERE stream_key = $1 AND group_name = $2
                  AND delivered_at <= now() - make_interval(secs => $4)
                ORDER BY entry_offset ASC
                LIMIT $5
            ),
            claimed AS (
                UPDATE log_pending_entries p
                SET consumer_id = $3,
                    delivery_count = p.delivery_count + 1,
                    delivered_at = now()
                FROM selected
                WHERE p.stream_key = $1 AND p.group_name = $2
                  AND p.entry_offset = selected.entry_offset
                RETURNING p.entry_offset, p.delivery_count
            )
            SELECT e.entry_offset, e.job_id, e.step_id, e.line_number, e.output,
                   e.appended_at, c.delivery_count
            FROM claimed c
            JOIN log_stream_entries e
              ON e.stream_key = $1 AND e.entry_offset = c.entry_offset
            ORDER BY e.entry_offset ASC
            "#,
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .bind(consumer.as_str())
        .bind(min_idle.as_secs_f64())
        .bind(to_limit(count))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        if !rows.is_empty() {
            tracing::debug!(
                "Consumer {} reclaimed {} idle entries on {}/{}",
                consumer,
                rows.len(),
                key,
                group
            );
        }

        collect(rows)
    }

    async fn ack(&self, key: &StreamKey, group: &GroupName, offsets: &[Offset]) -> Result<u64> {
        let offsets = offsets
            .iter()
            .map(|offset| to_db(offset.get(), "offset"))
            .collect::<Result<Vec<i64>>>()?;

        let mut tx = self.pool.begin().await?;
        Self::lock_group(&mut tx, key, group).await?;

        let result = sqlx::query(
            r#"
            DELETE FROM log_pending_entries
            WHERE stream_key = $1 AND group_name = $2 AND entry_offset = ANY($3)
            "#,
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .bind(&offsets)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }

    async fn pending_summary(&self, key: &StreamKey, group: &GroupName) -> Result<PendingSummary> {
        let exists: Option<(i64,)> = sqlx::query_as(
            "SELECT last_delivered FROM log_consumer_groups WHERE stream_key = $1 AND group_name = $2",
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if exists.is_none() {
            return Err(StoreError::group_not_found(key, group));
        }

        let rows = sqlx::query_as::<_, ConsumerPendingRow>(
            r#"
            SELECT consumer_id,
                   COUNT(*) AS pending,
                   MIN(entry_offset) AS lowest,
                   MAX(entry_offset) AS highest
            FROM log_pending_entries
            WHERE stream_key = $1 AND group_name = $2
            GROUP BY consumer_id
            ORDER BY consumer_id ASC
            "#,
        )
        .bind(key.as_str())
        .bind(group.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut summary = PendingSummary::default();
        for row in rows {
            let lowest = to_offset(row.lowest)?;
            let highest = to_offset(row.highest)?;
            let pending = u64::try_from(row.pending).unwrap_or_default();

            summary.count += pending;
            summary.lowest = Some(summary.lowest.map_or(lowest, |l| l.min(lowest)));
            summary.highest = Some(summary.highest.map_or(highest, |h| h.max(highest)));
            summary.consumers.push(ConsumerPending {
                consumer: ConsumerId::parse(row.consumer_id)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                pending,
            });
        }

        Ok(summary)
    }

    async fn groups(&self, key: &StreamKey) -> Result<Vec<GroupInfo>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT g.group_name,
                   g.last_delivered,
                   COALESCE(MIN(p.entry_offset) - 1, g.last_delivered) AS acked_through,
                   COUNT(p.entry_offset) AS pending,
                   COUNT(DISTINCT p.consumer_id) AS consumers
            FROM log_consumer_groups g
            LEFT JOIN log_pending_entries p
              ON p.stream_key = g.stream_key AND p.group_name = g.group_name
            WHERE g.stream_key = $1
            GROUP BY g.group_name, g.last_delivered
            ORDER BY g.group_name ASC
            "#,
        )
        .bind(key.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(GroupInfo {
                    name: GroupName::parse(row.group_name)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    last_delivered: to_offset(row.last_delivered)?,
                    acked_through: to_offset(row.acked_through)?,
                    pending: u64::try_from(row.pending).unwrap_or_default(),
                    consumers: u64::try_from(row.consumers).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn range(
        &self,
        key: &StreamKey,
        after: Offset,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT entry_offset, job_id, step_id, line_number, output, appended_at
            FROM log_stream_entries
            WHERE stream_key = $1 AND entry_offset > $2
            ORDER BY entry_offset ASC
            LIMIT $3
            "#,
        )
        .bind(key.as_str())
        .bind(to_db(after.get(), "offset")?)
        .bind(to_limit(count))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn stream_info(&self, key: &StreamKey) -> Result<Option<StreamInfo>> {
        let row: Option<(i64, chrono::DateTime<chrono::Utc>, i64)> = sqlx::query_as(
            r#"
            SELECT s.last_offset,
                   s.created_at,
                   (SELECT COUNT(*) FROM log_stream_entries e WHERE e.stream_key = s.stream_key)
            FROM log_streams s
            WHERE s.stream_key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(last_offset, created_at, length)| {
            Ok(StreamInfo {
                key: key.clone(),
                length: u64::try_from(length).unwrap_or_default(),
                last_offset: to_offset(last_offset)?,
                created_at,
            })
        })
        .transpose()
    }
}
