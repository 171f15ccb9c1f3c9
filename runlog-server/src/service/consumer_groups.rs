//! Consumer Group Manager
//!
//! Registers the configured reader groups (by default `CLI` and `UI`) on a
//! job's stream.

use std::sync::Arc;

use runlog_core::domain::group::{GroupName, GroupStart};
use runlog_core::domain::job::{JobId, StreamKey};
use runlog_core::dto::group::{GroupSetup, SetupOutcome, SetupReport};

use crate::store::{GroupCreation, StreamStore};

#[derive(Clone)]
pub struct ConsumerGroupManager {
    store: Arc<dyn StreamStore>,
    groups: Vec<GroupName>,
}

impl ConsumerGroupManager {
    pub fn new(store: Arc<dyn StreamStore>, groups: Vec<GroupName>) -> Self {
        Self { store, groups }
    }

    /// Manager for the default `CLI` and `UI` groups
    pub fn with_default_groups(store: Arc<dyn StreamStore>) -> Self {
        Self::new(store, GroupName::defaults())
    }

    pub fn groups(&self) -> &[GroupName] {
        &self.groups
    }

    /// Create every configured group on the job's stream
    ///
    /// Each group is attempted on its own; a failure is logged and recorded
    /// in the report, and the remaining groups are still attempted. An
    /// existing group counts as success.
    pub async fn setup_consumer_groups(&self, job_id: &JobId) -> SetupReport {
        let key = StreamKey::for_job(job_id);
        let mut report = SetupReport::new(job_id.clone());

        for group in &self.groups {
            let setup = match self.store.create_group(&key, group, GroupStart::Latest).await {
                Ok(GroupCreation::Created) => {
                    tracing::info!("Created consumer group {} for job {}", group, job_id);
                    GroupSetup {
                        group: group.clone(),
                        outcome: SetupOutcome::Created,
                        error: None,
                    }
                }
                Ok(GroupCreation::AlreadyExists) => {
                    tracing::debug!("Consumer group {} already exists for job {}", group, job_id);
                    GroupSetup {
                        group: group.clone(),
                        outcome: SetupOutcome::Existing,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        group = %group,
                        "Failed to create consumer group: {}",
                        e
                    );
                    GroupSetup {
                        group: group.clone(),
                        outcome: SetupOutcome::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };

            report.groups.push(setup);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStreamStore;
    use crate::store::testing::FaultyStore;

    #[tokio::test]
    async fn test_setup_creates_both_default_groups() {
        let store = Arc::new(MemoryStreamStore::new());
        let manager = ConsumerGroupManager::with_default_groups(store.clone());

        let report = manager.setup_consumer_groups(&JobId::from(42)).await;

        assert_eq!(report.outcome("CLI"), Some(SetupOutcome::Created));
        assert_eq!(report.outcome("UI"), Some(SetupOutcome::Created));

        let groups = store.groups(&StreamKey::from(&JobId::from(42))).await.unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["CLI", "UI"]);
    }

    #[tokio::test]
    async fn test_partial_preexistence_is_success() {
        let store = Arc::new(MemoryStreamStore::new());
        let key = StreamKey::from(&JobId::from(9));
        store
            .create_group(&key, &GroupName::ui(), GroupStart::Latest)
            .await
            .unwrap();

        let manager = ConsumerGroupManager::with_default_groups(store);
        let report = manager.setup_consumer_groups(&JobId::from(9)).await;

        assert_eq!(report.outcome("CLI"), Some(SetupOutcome::Created));
        assert_eq!(report.outcome("UI"), Some(SetupOutcome::Existing));
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_custom_group_list() {
        let store = Arc::new(MemoryStreamStore::new());
        let audit = GroupName::parse("audit").unwrap();
        let manager = ConsumerGroupManager::new(store, vec![audit.clone()]);

        let report = manager.setup_consumer_groups(&JobId::from("job-1")).await;

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].group, audit);
    }

    #[tokio::test]
    async fn test_one_group_failing_does_not_block_the_other() {
        let store = Arc::new(FaultyStore::new());
        store.fail_group(GroupName::cli());

        let manager = ConsumerGroupManager::with_default_groups(store.clone());
        let report = manager.setup_consumer_groups(&JobId::from(5)).await;

        assert_eq!(report.outcome("CLI"), Some(SetupOutcome::Failed));
        assert_eq!(report.outcome("UI"), Some(SetupOutcome::Created));
        assert!(report.groups[0].error.is_some());
        assert!(report.has_failures());
    }
}
