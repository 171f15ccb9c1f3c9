//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod groups;
mod replay;
mod send;
mod tail;

use anyhow::Result;
use clap::Subcommand;
use runlog_client::LogStreamClient;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Follow a job's log through a consumer group
    Tail(tail::TailArgs),
    /// Create a job's stream and its consumer groups
    Setup {
        /// Job ID
        job_id: String,
    },
    /// List the consumer groups of a job
    Groups {
        /// Job ID
        job_id: String,
    },
    /// Show unacknowledged entries of a group
    Pending {
        /// Job ID
        job_id: String,

        /// Consumer group
        #[arg(long, default_value = "CLI")]
        group: String,
    },
    /// Print a job's log without using a consumer group
    Replay(replay::ReplayArgs),
    /// Ship lines from stdin to a job's log
    Send(send::SendArgs),
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = LogStreamClient::new(&config.server_url);

    match command {
        Commands::Tail(args) => tail::tail(&client, args).await,
        Commands::Setup { job_id } => groups::setup(&client, &job_id).await,
        Commands::Groups { job_id } => groups::list(&client, &job_id).await,
        Commands::Pending { job_id, group } => groups::pending(&client, &job_id, &group).await,
        Commands::Replay(args) => replay::replay(&client, args).await,
        Commands::Send(args) => send::send(&client, args).await,
    }
}
