//! Value types exchanged with regional table endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a regional table, as returned by table creation (an ARN).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableHandle(String);

impl TableHandle {
    pub fn new(arn: impl Into<String>) -> Self {
        Self(arn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position in a table's replication stream.
///
/// Positions are totally ordered; a replica has caught up once its
/// position is at or past the group's write frontier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StreamPosition(u64);

impl StreamPosition {
    pub const ZERO: StreamPosition = StreamPosition(0);

    pub fn new(position: u64) -> Self {
        Self(position)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Whether this position is at or past `frontier`.
    pub fn has_reached(&self, frontier: StreamPosition) -> bool {
        *self >= frontier
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a regional table as reported by its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    Creating,
    Active,
    Deleting,
    NotFound,
}

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    #[serde(rename = "S")]
    String,
    #[serde(rename = "N")]
    Number,
    #[serde(rename = "B")]
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// Schema every replica of a group is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub table_name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
    pub attributes: Vec<AttributeDefinition>,
}

impl TableSchema {
    /// Schema with a single string partition key.
    pub fn new(table_name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        let partition_key = partition_key.into();
        Self {
            table_name: table_name.into(),
            attributes: vec![AttributeDefinition::new(
                partition_key.clone(),
                AttributeType::String,
            )],
            partition_key,
            sort_key: None,
        }
    }

    /// Add a sort key with the given attribute type.
    pub fn with_sort_key(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        let name = name.into();
        self.attributes.retain(|a| a.name != name);
        self.attributes
            .push(AttributeDefinition::new(name.clone(), attribute_type));
        self.sort_key = Some(name);
        self
    }

    /// Check the schema is acceptable to a regional endpoint.
    ///
    /// Returns None if valid, or Some(reason) if invalid.
    pub fn validate(&self) -> Option<String> {
        let name_ok = (3..=255).contains(&self.table_name.len())
            && self
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !name_ok {
            return Some(format!(
                "table name '{}' must be 3-255 characters of [A-Za-z0-9_.-]",
                self.table_name
            ));
        }

        let keys = std::iter::once(&self.partition_key).chain(self.sort_key.iter());
        for key in keys {
            if !self.attributes.iter().any(|a| &a.name == key) {
                return Some(format!("key attribute '{}' has no definition", key));
            }
        }

        None
    }
}
