use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // One row per job stream, holding its offset counter
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_streams (
            stream_key VARCHAR(255) PRIMARY KEY,
            last_offset BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_stream_entries (
            stream_key VARCHAR(255) NOT NULL REFERENCES log_streams(stream_key) ON DELETE CASCADE,
            entry_offset BIGINT NOT NULL,
            job_id VARCHAR(255) NOT NULL,
            step_id VARCHAR(255) NOT NULL,
            line_number BIGINT NOT NULL,
            output TEXT NOT NULL,
            appended_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (stream_key, entry_offset)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_consumer_groups (
            stream_key VARCHAR(255) NOT NULL REFERENCES log_streams(stream_key) ON DELETE CASCADE,
            group_name VARCHAR(64) NOT NULL,
            last_delivered BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (stream_key, group_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pending entries list: delivered to a consumer, not yet acknowledged
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_pending_entries (
            stream_key VARCHAR(255) NOT NULL,
            group_name VARCHAR(64) NOT NULL,
            entry_offset BIGINT NOT NULL,
            consumer_id VARCHAR(128) NOT NULL,
            delivered_at TIMESTAMPTZ NOT NULL,
            delivery_count INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (stream_key, group_name, entry_offset),
            FOREIGN KEY (stream_key, group_name)
                REFERENCES log_consumer_groups(stream_key, group_name) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_log_pending_delivered_at ON log_pending_entries(stream_key, group_name, delivered_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_log_pending_consumer ON log_pending_entries(stream_key, group_name, consumer_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
