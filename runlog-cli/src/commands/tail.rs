//! Tail command
//!
//! Follows a job's log through a consumer group. Lines are acknowledged
//! only after they are printed, so an interrupted tail sees them again on
//! its next start.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use runlog_client::LogStreamClient;
use runlog_core::domain::group::{ConsumerId, GroupName};
use runlog_core::domain::job::JobId;
use runlog_core::domain::stream::DeliveredEntry;

use crate::config::default_consumer;
use crate::output::{print_by_step, print_entry};

#[derive(Args)]
pub struct TailArgs {
    /// Job ID
    job_id: String,

    /// Consumer group to read through
    #[arg(long, default_value = "CLI")]
    group: String,

    /// Consumer name within the group (default: cli-<hostname>)
    #[arg(long)]
    consumer: Option<String>,

    /// Entries per request
    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Keep waiting for new lines
    #[arg(short, long)]
    follow: bool,

    /// How long each request waits for new lines when following
    #[arg(long, default_value_t = 5000)]
    block_ms: u64,

    /// Strip ANSI color codes
    #[arg(long)]
    plain: bool,

    /// Regroup lines by step
    #[arg(long)]
    by_step: bool,
}

pub async fn tail(client: &LogStreamClient, args: TailArgs) -> Result<()> {
    let job_id = JobId::parse(&args.job_id)?;
    let group = GroupName::parse(&args.group)?;
    let consumer = match &args.consumer {
        Some(name) => ConsumerId::parse(name.as_str())?,
        None => default_consumer()?,
    };

    tracing::debug!("Tailing job {} as {}/{}", job_id, group, consumer);

    if args.follow {
        tokio::select! {
            result = follow(client, &job_id, &group, &consumer, &args) => result,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    } else {
        catch_up(client, &job_id, &group, &consumer, &args).await
    }
}

/// Read everything currently available, print it, then acknowledge it
async fn catch_up(
    client: &LogStreamClient,
    job_id: &JobId,
    group: &GroupName,
    consumer: &ConsumerId,
    args: &TailArgs,
) -> Result<()> {
    let mut entries: Vec<DeliveredEntry> = Vec::new();
    let mut resume = true;

    loop {
        let batch = read(client, job_id, group, consumer, args.count, None, resume).await?;
        resume = false;
        if batch.is_empty() {
            break;
        }
        entries.extend(batch);
    }

    if entries.is_empty() {
        println!("{}", "No new log lines.".yellow());
        return Ok(());
    }

    // own pending entries may repeat lines already read in this run
    entries.sort_by_key(|e| e.offset);
    entries.dedup_by_key(|e| e.offset);

    show(&entries, args);
    acknowledge(client, job_id, group, &entries).await
}

async fn follow(
    client: &LogStreamClient,
    job_id: &JobId,
    group: &GroupName,
    consumer: &ConsumerId,
    args: &TailArgs,
) -> Result<()> {
    let block = Some(Duration::from_millis(args.block_ms));
    let mut resume = true;

    loop {
        let entries = read(client, job_id, group, consumer, args.count, block, resume).await?;
        resume = false;

        if entries.is_empty() {
            continue;
        }

        show(&entries, args);
        acknowledge(client, job_id, group, &entries).await?;
    }
}

async fn read(
    client: &LogStreamClient,
    job_id: &JobId,
    group: &GroupName,
    consumer: &ConsumerId,
    count: usize,
    block: Option<Duration>,
    resume: bool,
) -> Result<Vec<DeliveredEntry>> {
    match client
        .read_group(job_id, group, consumer, Some(count), block, resume)
        .await
    {
        Ok(response) => Ok(response.entries),
        Err(e) if e.is_not_found() => anyhow::bail!(
            "group {} does not exist for job {}; run `runlog setup {}` first",
            group,
            job_id,
            job_id
        ),
        Err(e) => Err(e).context("Failed to read log entries"),
    }
}

fn show(entries: &[DeliveredEntry], args: &TailArgs) {
    if args.by_step {
        print_by_step(entries.iter().map(|e| &e.record), args.plain);
    } else {
        for entry in entries {
            print_entry(entry.offset, &entry.record, args.plain);
        }
    }
}

async fn acknowledge(
    client: &LogStreamClient,
    job_id: &JobId,
    group: &GroupName,
    entries: &[DeliveredEntry],
) -> Result<()> {
    let offsets = entries.iter().map(|e| e.offset).collect();
    client
        .ack(job_id, group, offsets)
        .await
        .context("Failed to acknowledge log entries")?;
    Ok(())
}
