//! Result and notification layer
//!
//! Read-only projections of committed group state returned to callers,
//! and the broadcast channel of committed group events. Nothing here
//! mutates a group.

mod notify;

pub use notify::{EventNotifier, GroupEvent};

use serde::{Deserialize, Serialize};

use crate::group::ReplicationGroup;

macro_rules! group_result {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            /// Snapshot of the group when the call returned.
            pub replication_group: ReplicationGroup,
        }

        impl $name {
            pub fn new(replication_group: ReplicationGroup) -> Self {
                Self { replication_group }
            }

            /// Replace the carried snapshot.
            pub fn with_replication_group(mut self, replication_group: ReplicationGroup) -> Self {
                self.replication_group = replication_group;
                self
            }

            pub fn replication_group(&self) -> &ReplicationGroup {
                &self.replication_group
            }

            pub fn into_replication_group(self) -> ReplicationGroup {
                self.replication_group
            }
        }

        impl From<ReplicationGroup> for $name {
            fn from(replication_group: ReplicationGroup) -> Self {
                Self::new(replication_group)
            }
        }
    };
}

group_result!(
    /// Outcome of an ADD: the group with the member in its final (sync) or
    /// current (async) state.
    AddReplicationGroupMemberResult
);

group_result!(
    /// Outcome of a REMOVE: the group without the member (sync) or with
    /// it in DELETING (async).
    RemoveReplicationGroupMemberResult
);

group_result!(
    /// A committed snapshot of one group.
    DescribeReplicationGroupResult
);
