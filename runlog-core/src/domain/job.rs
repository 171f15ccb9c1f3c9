//! Job identity and stream addressing

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Rejected job id
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobIdError {
    #[error("job id cannot be blank")]
    Blank,

    #[error("job id is {len} characters (max: {max})")]
    TooLong { len: usize, max: usize },
}

/// Identifier of the job that produced a log line
///
/// Kept opaque. Executors send job ids as JSON integers while the HTTP path
/// carries them as strings, so both forms deserialize to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Longest id a stream key can hold
    pub const MAX_LEN: usize = 255;

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a job id that is known to address a stream
    pub fn parse(id: impl Into<String>) -> Result<Self, JobIdError> {
        let id = Self(id.into());
        id.check()?;
        Ok(id)
    }

    /// Reject blank ids and ids longer than [`JobId::MAX_LEN`] characters
    pub fn check(&self) -> Result<(), JobIdError> {
        if self.is_blank() {
            return Err(JobIdError::Blank);
        }

        let len = self.0.chars().count();
        if len > Self::MAX_LEN {
            return Err(JobIdError::TooLong {
                len,
                max: Self::MAX_LEN,
            });
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for JobId {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Signed(n) => JobId(n.to_string()),
            Raw::Unsigned(n) => JobId(n.to_string()),
            Raw::Text(s) => JobId(s),
        })
    }
}

/// Address of a job's log stream
///
/// There is exactly one stream per job, keyed by the job id's string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(String);

impl StreamKey {
    pub fn for_job(job_id: &JobId) -> Self {
        Self(job_id.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&JobId> for StreamKey {
    fn from(job_id: &JobId) -> Self {
        Self::for_job(job_id)
    }
}
