use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::membership::{MemberOperation, MemberState, MembershipResult};
use crate::region::{StreamPosition, TableHandle};

use super::ids::RegionId;

/// One region's participation record within a replication group.
///
/// Only the membership state machine changes a member; callers see
/// members through group snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub region: RegionId,
    pub state: MemberState,
    pub operation: MemberOperation,
    /// Set once the regional table exists.
    pub table_handle: Option<TableHandle>,
    /// Recorded when bootstrap completes.
    pub stream_position: Option<StreamPosition>,
    /// Populated on FAILED, cleared when the member leaves FAILED.
    pub last_error: Option<String>,
    /// When the current state was committed.
    pub state_entered_at: DateTime<Utc>,
}

impl Member {
    /// A member requested by an ADD, before any region call.
    pub fn for_add(region: RegionId, now: DateTime<Utc>) -> Self {
        Self {
            region,
            state: MemberState::Creating,
            operation: MemberOperation::Add,
            table_handle: None,
            stream_position: None,
            last_error: None,
            state_entered_at: now,
        }
    }

    /// Apply a lifecycle transition, stamping the entry time.
    ///
    /// Leaving FAILED clears the diagnostic.
    pub fn transition(
        &mut self,
        next: impl FnOnce(MemberState) -> MembershipResult<MemberState>,
        now: DateTime<Utc>,
    ) -> MembershipResult<()> {
        let next = next(self.state)?;
        if self.state == MemberState::Failed && next != MemberState::Failed {
            self.last_error = None;
        }
        self.state = next;
        self.state_entered_at = now;
        Ok(())
    }

    /// Time spent in the current state as of `now`.
    pub fn time_in_state(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.state_entered_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> Member {
        Member::for_add(RegionId::new("us-east-1").unwrap(), Utc::now())
    }

    #[test]
    fn test_new_member_is_creating() {
        let m = member();
        assert_eq!(m.state, MemberState::Creating);
        assert_eq!(m.operation, MemberOperation::Add);
        assert!(m.table_handle.is_none());
    }

    #[test]
    fn test_transition_stamps_entry_time() {
        let mut m = member();
        let later = m.state_entered_at + chrono::Duration::seconds(5);

        m.transition(MemberState::begin_bootstrap, later).unwrap();

        assert_eq!(m.state, MemberState::Bootstrapping);
        assert_eq!(m.state_entered_at, later);
        assert_eq!(m.time_in_state(later + chrono::Duration::seconds(1)).num_seconds(), 1);
    }

    #[test]
    fn test_forbidden_transition_leaves_member_untouched() {
        let mut m = member();
        let before = m.clone();
        assert!(m.transition(MemberState::activate, Utc::now()).is_err());
        assert_eq!(m, before);
    }

    #[test]
    fn test_retry_clears_last_error() {
        let mut m = member();
        m.transition(MemberState::fail, Utc::now()).unwrap();
        m.last_error = Some("quota exceeded".into());

        m.transition(|s| s.retry(MemberOperation::Add), Utc::now())
            .unwrap();

        assert_eq!(m.state, MemberState::Creating);
        assert!(m.last_error.is_none());
    }
}
