//! Group setup and inspection commands

use anyhow::Result;
use colored::*;
use runlog_client::LogStreamClient;
use runlog_core::domain::group::GroupName;
use runlog_core::domain::job::JobId;
use runlog_core::dto::group::SetupOutcome;

/// Create the job's stream and consumer groups
pub async fn setup(client: &LogStreamClient, job_id: &str) -> Result<()> {
    let job_id = JobId::parse(job_id)?;
    let report = client.setup_consumer_groups(&job_id).await?;

    println!("{}", format!("Consumer groups for job {}:", job_id).bold());
    for group in &report.groups {
        let outcome = match group.outcome {
            SetupOutcome::Created => "created".green(),
            SetupOutcome::Existing => "existing".normal(),
            SetupOutcome::Failed => "failed".red(),
        };
        match &group.error {
            Some(error) => println!("  {:<12} {} ({})", group.group.as_str(), outcome, error.dimmed()),
            None => println!("  {:<12} {}", group.group.as_str(), outcome),
        }
    }

    if report.has_failures() {
        anyhow::bail!("some consumer groups could not be created; run setup again");
    }

    Ok(())
}

/// List consumer groups with their cursors
pub async fn list(client: &LogStreamClient, job_id: &str) -> Result<()> {
    let job_id = JobId::parse(job_id)?;
    let groups = client.list_groups(&job_id).await?;

    if groups.is_empty() {
        println!("{}", format!("No consumer groups for job {}.", job_id).yellow());
        return Ok(());
    }

    println!(
        "{:<12} {:>10} {:>10} {:>8} {:>10}",
        "GROUP".bold(),
        "DELIVERED".bold(),
        "ACKED".bold(),
        "PENDING".bold(),
        "CONSUMERS".bold()
    );
    for group in groups {
        println!(
            "{:<12} {:>10} {:>10} {:>8} {:>10}",
            group.name.as_str(),
            group.last_delivered.to_string(),
            group.acked_through.to_string(),
            group.pending,
            group.consumers
        );
    }

    Ok(())
}

/// Show a group's pending entries per consumer
pub async fn pending(client: &LogStreamClient, job_id: &str, group: &str) -> Result<()> {
    let job_id = JobId::parse(job_id)?;
    let group = GroupName::parse(group)?;
    let summary = client.pending(&job_id, &group).await?;

    if summary.count == 0 {
        println!("{}", format!("Nothing pending in group {}.", group).green());
        return Ok(());
    }

    let range = match (summary.lowest, summary.highest) {
        (Some(lowest), Some(highest)) => format!(" (offsets {}..={})", lowest, highest),
        _ => String::new(),
    };
    println!(
        "{}",
        format!("{} pending entries in group {}{}", summary.count, group, range).bold()
    );
    for consumer in summary.consumers {
        println!("  {} {:<24} {}", "▸".cyan(), consumer.consumer.as_str(), consumer.pending);
    }

    Ok(())
}
