//! Consumer group DTOs

use serde::{Deserialize, Serialize};

use crate::domain::group::{ConsumerId, GroupName};
use crate::domain::job::JobId;
use crate::domain::stream::{DeliveredEntry, Offset};

/// Result of preparing one group during setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupOutcome {
    Created,
    Existing,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSetup {
    pub group: GroupName,
    pub outcome: SetupOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a setup-consumer-groups call
///
/// Setup is idempotent: groups that already existed are reported as
/// `existing`, never as failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupReport {
    pub job_id: JobId,
    pub groups: Vec<GroupSetup>,
}

impl SetupReport {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            groups: Vec::new(),
        }
    }

    pub fn outcome(&self, group: &str) -> Option<SetupOutcome> {
        self.groups
            .iter()
            .find(|g| g.group.as_str() == group)
            .map(|g| g.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.groups.iter().any(|g| g.outcome == SetupOutcome::Failed)
    }
}

/// Query parameters of a group read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadQuery {
    pub consumer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Wait up to this many milliseconds for entries when none are available
    #[serde(default, alias = "block_ms", skip_serializing_if = "Option::is_none")]
    pub block_ms: Option<u64>,
    /// Redeliver this consumer's own unacknowledged entries first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub job_id: JobId,
    pub group: GroupName,
    pub consumer: ConsumerId,
    pub entries: Vec<DeliveredEntry>,
}

impl ReadResponse {
    pub fn offsets(&self) -> Vec<Offset> {
        self.entries.iter().map(|e| e.offset).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
    pub offsets: Vec<Offset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    /// Entries that were pending and are now acknowledged
    pub acknowledged: u64,
}

/// Explicit reclaim of idle pending entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub consumer: String,
    pub min_idle_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerPending {
    pub consumer: ConsumerId,
    pub pending: u64,
}

/// Delivered-but-unacknowledged entries of a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    pub count: u64,
    pub lowest: Option<Offset>,
    pub highest: Option<Offset>,
    pub consumers: Vec<ConsumerPending>,
}

/// State of one consumer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub name: GroupName,
    /// Last offset handed out to any consumer of the group
    pub last_delivered: Offset,
    /// Every entry at or below this offset has been acknowledged
    pub acked_through: Offset,
    pub pending: u64,
    pub consumers: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_report_lookup() {
        let mut report = SetupReport::new(JobId::from(42));
        report.groups.push(GroupSetup {
            group: GroupName::cli(),
            outcome: SetupOutcome::Existing,
            error: None,
        });

        assert_eq!(report.outcome("CLI"), Some(SetupOutcome::Existing));
        assert_eq!(report.outcome("UI"), None);
        assert!(!report.has_failures());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["groups"][0]["outcome"], "existing");
        assert!(json["groups"][0].get("error").is_none());
    }
}
