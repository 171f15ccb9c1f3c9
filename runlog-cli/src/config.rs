//! Configuration module
//!
//! Handles CLI configuration and consumer naming.

use runlog_core::domain::group::{ConsumerId, NameError};

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the runlog server
    pub server_url: String,
}

/// Consumer id used when `--consumer` is not given
///
/// `cli-<hostname>` when the host name is known, `cli-<random>` otherwise.
/// A stable name lets a restarted tail pick up its own unacknowledged lines.
pub fn default_consumer() -> Result<ConsumerId, NameError> {
    let suffix = std::env::var("HOSTNAME")
        .ok()
        .map(|host| sanitize(&host))
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..8].to_string());

    let name: String = format!("cli-{}", suffix)
        .chars()
        .take(ConsumerId::MAX_LEN)
        .collect();

    ConsumerId::parse(name)
}

/// Replace characters a consumer name may not contain
fn sanitize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
