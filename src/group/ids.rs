//! Group and region identifiers
//!
//! Both identifiers are validated on construction so that every value
//! reaching the coordinator or the state store is well formed:
//! - Group ids double as record file names in the file-backed store
//! - Region ids must look like a cloud region code (`us-east-1`)

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum length of a group identifier.
pub const MAX_GROUP_ID_LEN: usize = 255;

static GROUP_ID_PATTERN: OnceLock<Regex> = OnceLock::new();
static REGION_PATTERN: OnceLock<Regex> = OnceLock::new();

fn group_id_pattern() -> &'static Regex {
    GROUP_ID_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").unwrap_or_else(|e| panic!("group id pattern: {e}"))
    })
}

fn region_pattern() -> &'static Regex {
    REGION_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]{2}(-[a-z]+)+-[0-9]{1,2}$").unwrap_or_else(|e| panic!("region pattern: {e}"))
    })
}

/// Identifier rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}': {reason}")]
pub struct InvalidIdentifier {
    /// Which identifier was being parsed ("group id" or "region").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// Opaque, stable identifier of a replication group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    /// Parse and validate a group identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        let reject = |reason| InvalidIdentifier {
            kind: "group id",
            value: value.clone(),
            reason,
        };

        if value.is_empty() {
            return Err(reject("must not be empty"));
        }
        if value.len() > MAX_GROUP_ID_LEN {
            return Err(reject("must be at most 255 characters"));
        }
        if !group_id_pattern().is_match(&value) {
            return Err(reject(
                "may only contain letters, digits, '_', '.', '-' and must not start with '.' or '-'",
            ));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GroupId {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cloud region code such as `us-east-1` or `ap-southeast-2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionId(String);

impl RegionId {
    /// Parse and validate a region code.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        if !region_pattern().is_match(&value) {
            return Err(InvalidIdentifier {
                kind: "region",
                value,
                reason: "expected a region code like 'us-east-1'",
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RegionId {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionId> for String {
    fn from(id: RegionId) -> Self {
        id.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
