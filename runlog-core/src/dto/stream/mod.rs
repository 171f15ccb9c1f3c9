//! Stream replay and inspection DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::StreamKey;
use crate::domain::stream::{Offset, StreamEntry};

/// Query parameters of a group-independent replay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayQuery {
    /// Only entries with an offset greater than this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    pub entries: Vec<StreamEntry>,
    /// Pass as `after` to continue the replay
    pub next_after: Offset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub key: StreamKey,
    pub length: u64,
    pub last_offset: Offset,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
