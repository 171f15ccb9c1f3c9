//! Replay command

use anyhow::Result;
use clap::Args;
use colored::*;
use runlog_client::LogStreamClient;
use runlog_core::domain::job::JobId;
use runlog_core::domain::stream::{Offset, StreamEntry};

use crate::output::{print_by_step, print_entry};

#[derive(Args)]
pub struct ReplayArgs {
    /// Job ID
    job_id: String,

    /// Start after this offset
    #[arg(long, default_value_t = 0)]
    after: u64,

    /// Maximum number of lines (default: everything)
    #[arg(long)]
    count: Option<usize>,

    /// Strip ANSI color codes
    #[arg(long)]
    plain: bool,

    /// Regroup lines by step
    #[arg(long)]
    by_step: bool,
}

/// Page through the stream without touching any consumer group
pub async fn replay(client: &LogStreamClient, args: ReplayArgs) -> Result<()> {
    let job_id = JobId::parse(&args.job_id)?;
    let mut after = Offset::new(args.after);
    let mut entries: Vec<StreamEntry> = Vec::new();

    loop {
        let remaining = args.count.map(|c| c.saturating_sub(entries.len()));
        if remaining == Some(0) {
            break;
        }

        let page = client.replay(&job_id, after, remaining).await?;
        if page.entries.is_empty() {
            break;
        }
        after = page.next_after;
        entries.extend(page.entries);
    }

    if entries.is_empty() {
        println!("{}", format!("No log lines for job {}.", job_id).yellow());
        return Ok(());
    }

    if args.by_step {
        print_by_step(entries.iter().map(|e| &e.record), args.plain);
    } else {
        for entry in &entries {
            print_entry(entry.offset, &entry.record, args.plain);
        }
    }

    Ok(())
}
