use thiserror::Error;

use crate::group::GroupId;

/// Errors raised by a group state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("replication group {0} not found")]
    GroupNotFound(GroupId),

    #[error("replication group {0} already exists")]
    GroupAlreadyExists(GroupId),

    #[error("record for group {group_id} is corrupted: {reason}")]
    Corrupted { group_id: String, reason: String },

    #[error("record for group {expected} holds group {found}")]
    GroupIdMismatch { expected: GroupId, found: GroupId },

    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode group record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn corrupted(group_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            group_id: group_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the group simply is not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::GroupNotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
