use std::future::Future;

use crate::group::{GroupId, ReplicationGroup};

use super::errors::StoreResult;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write landed; the stored group now carries `version`.
    Committed { version: u64 },

    /// Someone else committed first; the stored group is at `current_version`.
    Conflict { current_version: u64 },
}

impl CasOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Durable record of replication groups.
///
/// The store is the single source of truth for group state. All writes
/// after creation are compare-and-swap on the group version, which makes
/// the history of each group linearizable: a conflict means a concurrent
/// writer committed first, and the caller must reload and re-evaluate.
pub trait GroupStore: Send + Sync {
    /// Persist a new group at version 0.
    fn create(&self, group: ReplicationGroup) -> impl Future<Output = StoreResult<()>> + Send;

    /// Load the latest committed snapshot of a group.
    fn load(
        &self,
        group_id: &GroupId,
    ) -> impl Future<Output = StoreResult<ReplicationGroup>> + Send;

    /// Replace the group if its stored version is `expected_version`.
    ///
    /// On commit the stored group's version is set to
    /// `expected_version + 1`, whatever version `group` carried.
    fn compare_and_swap(
        &self,
        group_id: &GroupId,
        expected_version: u64,
        group: ReplicationGroup,
    ) -> impl Future<Output = StoreResult<CasOutcome>> + Send;

    /// Delete the group if its stored version is `expected_version`.
    ///
    /// A committed delete reports the version the group was deleted at.
    fn delete(
        &self,
        group_id: &GroupId,
        expected_version: u64,
    ) -> impl Future<Output = StoreResult<CasOutcome>> + Send;

    /// Ids of all stored groups, in order.
    fn list_group_ids(&self) -> impl Future<Output = StoreResult<Vec<GroupId>>> + Send;
}
