//! Stream positions and stored entries

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::log::LogRecord;

/// Store-assigned position of an entry within one stream
///
/// Offsets are strictly increasing per stream and start at 1.
/// [`Offset::ZERO`] denotes the position before the first entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(u64);

impl Offset {
    pub const ZERO: Offset = Offset(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Offset {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Offset)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// An entry as stored in a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    pub offset: Offset,
    #[serde(flatten)]
    pub record: LogRecord,
    pub appended_at: chrono::DateTime<chrono::Utc>,
}

/// An entry handed to a consumer of a group
///
/// `delivery_count` is 1 on first delivery and grows every time the entry is
/// redelivered or reclaimed before being acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredEntry {
    pub offset: Offset,
    #[serde(flatten)]
    pub record: LogRecord,
    pub appended_at: chrono::DateTime<chrono::Utc>,
    pub delivery_count: u32,
}

impl DeliveredEntry {
    pub fn from_entry(entry: StreamEntry, delivery_count: u32) -> Self {
        Self {
            offset: entry.offset,
            record: entry.record,
            appended_at: entry.appended_at,
            delivery_count,
        }
    }

    /// True when this is not the first time the entry is delivered
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}
