//! Consumer group and consumer naming

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected group or consumer name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("{kind} name cannot be empty")]
    Empty { kind: &'static str },

    #[error("{kind} name exceeds {max} characters")]
    TooLong { kind: &'static str, max: usize },

    #[error("{kind} name contains invalid character {ch:?}")]
    InvalidChar { kind: &'static str, ch: char },
}

fn validate_name(kind: &'static str, value: &str, max: usize) -> Result<(), NameError> {
    if value.is_empty() {
        return Err(NameError::Empty { kind });
    }

    if value.chars().count() > max {
        return Err(NameError::TooLong { kind, max });
    }

    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(NameError::InvalidChar { kind, ch });
    }

    Ok(())
}

/// Name of a consumer group
///
/// Every reader class (interactive CLI, web UI, ...) owns one group per job
/// stream and therefore its own read cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupName(String);

impl GroupName {
    pub const CLI: &'static str = "CLI";
    pub const UI: &'static str = "UI";
    pub const MAX_LEN: usize = 64;

    pub fn parse(value: impl Into<String>) -> Result<Self, NameError> {
        let value = value.into();
        validate_name("group", &value, Self::MAX_LEN)?;
        Ok(Self(value))
    }

    pub fn cli() -> Self {
        Self(Self::CLI.to_string())
    }

    pub fn ui() -> Self {
        Self(Self::UI.to_string())
    }

    /// The groups every job stream is prepared with
    pub fn defaults() -> Vec<GroupName> {
        vec![Self::cli(), Self::ui()]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GroupName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<GroupName> for String {
    fn from(value: GroupName) -> Self {
        value.0
    }
}

/// Name of one consumer inside a group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConsumerId(String);

impl ConsumerId {
    pub const MAX_LEN: usize = 128;

    pub fn parse(value: impl Into<String>) -> Result<Self, NameError> {
        let value = value.into();
        validate_name("consumer", &value, Self::MAX_LEN)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConsumerId {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ConsumerId> for String {
    fn from(value: ConsumerId) -> Self {
        value.0
    }
}

/// Where a newly created group's cursor starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStart {
    /// At the stream's current tail: only entries appended afterwards are delivered
    #[default]
    Latest,
    /// Before the first entry: the whole stream is delivered
    Beginning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_groups() {
        let names: Vec<String> = GroupName::defaults().into_iter().map(String::from).collect();
        assert_eq!(names, vec!["CLI", "UI"]);
    }

    #[test]
    fn test_group_name_validation() {
        assert!(GroupName::parse("web-viewer.v2").is_ok());
        assert_eq!(
            GroupName::parse(""),
            Err(NameError::Empty { kind: "group" })
        );
        assert!(matches!(
            GroupName::parse("has space"),
            Err(NameError::InvalidChar { ch: ' ', .. })
        ));
        assert!(matches!(
            GroupName::parse("x".repeat(65)),
            Err(NameError::TooLong { max: 64, .. })
        ));
    }

    #[test]
    fn test_consumer_id_deserialize_rejects_invalid() {
        let ok: Result<ConsumerId, _> = serde_json::from_str("\"cli-host1\"");
        assert!(ok.is_ok());

        let bad: Result<ConsumerId, _> = serde_json::from_str("\"cli/host1\"");
        assert!(bad.is_err());
    }
}
