//! Send command
//!
//! Ships stdin to a job's log the way an executor does: groups are set up
//! first, then lines are batched and sent periodically.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use runlog_client::{LogShipper, LogStreamClient, SettleOptions, wait_for_stream_settle};
use runlog_core::domain::job::JobId;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Args)]
pub struct SendArgs {
    /// Job ID
    job_id: String,

    /// Step the lines belong to
    #[arg(long)]
    step: String,

    /// Line number of the first line
    #[arg(long, default_value_t = 1)]
    start_line: u64,

    /// Seconds between batches
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Wait until the stream stops growing before exiting
    #[arg(long)]
    wait_settle: bool,
}

pub async fn send(client: &LogStreamClient, args: SendArgs) -> Result<()> {
    let job_id = JobId::parse(&args.job_id)?;
    let shipper = LogShipper::new(Arc::new(client.clone()));

    match shipper.setup_consumer_groups(&job_id).await {
        Ok(report) if report.has_failures() => {
            tracing::warn!("Some consumer groups for job {} were not created", job_id)
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Consumer group setup failed for job {}: {}", job_id, e),
    }

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let runner = {
        let shipper = shipper.clone();
        let interval = Duration::from_secs(args.interval.max(1));
        tokio::spawn(async move {
            shipper
                .run(interval, async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = args.start_line;
    let mut sent = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        shipper
            .push(job_id.clone(), args.step.as_str(), line_number, line)
            .await;
        line_number += 1;
        sent += 1;
    }

    let _ = stop_tx.send(());
    runner.await.context("Log shipper task failed")?;

    let unsent = shipper.pending().await;
    if unsent > 0 {
        anyhow::bail!("{} of {} lines could not be shipped", unsent, sent);
    }

    if args.wait_settle {
        let length = wait_for_stream_settle(client, &job_id, SettleOptions::default()).await?;
        println!("{}", format!("Stream for job {} holds {} lines", job_id, length).dimmed());
    }

    println!(
        "{}",
        format!("✓ Shipped {} lines to job {} step {}", sent, job_id, args.step).green()
    );

    Ok(())
}
