use serde::Serialize;
use tokio::sync::broadcast;

use crate::group::{GroupId, RegionId};
use crate::membership::MemberState;

/// Committed change to a replication group, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GroupEvent {
    GroupCreated {
        group_id: GroupId,
    },
    GroupDeleted {
        group_id: GroupId,
    },
    /// A member transition was committed at `version`.
    MemberStateChanged {
        group_id: GroupId,
        region: RegionId,
        from: Option<MemberState>,
        to: MemberState,
        version: u64,
    },
    /// A member was dropped from the group at `version`.
    MemberRemoved {
        group_id: GroupId,
        region: RegionId,
        version: u64,
    },
}

impl GroupEvent {
    pub fn group_id(&self) -> &GroupId {
        match self {
            Self::GroupCreated { group_id }
            | Self::GroupDeleted { group_id }
            | Self::MemberStateChanged { group_id, .. }
            | Self::MemberRemoved { group_id, .. } => group_id,
        }
    }
}

/// Fan-out of committed group events.
///
/// Publishing never blocks and never fails: events sent with no live
/// subscriber are dropped, and slow subscribers observe a lag error on
/// their receiver.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    sender: broadcast::Sender<GroupEvent>,
}

impl EventNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: GroupEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
