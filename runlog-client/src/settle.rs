//! Wait for a job's stream to stop growing
//!
//! Producers ship asynchronously, so a job can finish while its last lines
//! are still in flight. Polling the stream length until it stays put gives
//! consumers a point after which the stream is complete.

use std::time::Duration;

use runlog_core::domain::job::JobId;
use tokio::time::Instant;

use crate::LogStreamClient;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct SettleOptions {
    pub poll_interval: Duration,
    /// Consecutive unchanged polls needed
    pub stable_checks: u32,
    pub max_wait: Duration,
}

impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stable_checks: 3,
            max_wait: Duration::from_secs(300),
        }
    }
}

/// Poll the stream length until it is unchanged for `stable_checks` polls
///
/// A missing stream counts as length 0. Gives up after `max_wait` without
/// error.
///
/// # Returns
/// The last length seen
pub async fn wait_for_stream_settle(
    client: &LogStreamClient,
    job_id: &JobId,
    options: SettleOptions,
) -> Result<u64> {
    let started = Instant::now();
    let mut last: Option<u64> = None;
    let mut stable = 0;

    loop {
        let length = client
            .stream_info(job_id)
            .await?
            .map(|info| info.length)
            .unwrap_or(0);

        if last == Some(length) {
            stable += 1;
            if stable >= options.stable_checks {
                tracing::info!("Log stream for job {} settled at {} lines", job_id, length);
                return Ok(length);
            }
        } else {
            stable = 0;
            last = Some(length);
        }

        if started.elapsed() >= options.max_wait {
            tracing::warn!(
                "Log stream for job {} still changing after {:?}",
                job_id,
                options.max_wait
            );
            return Ok(length);
        }

        tokio::time::sleep(options.poll_interval).await;
    }
}
