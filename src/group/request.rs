//! Membership change requests
//!
//! A request lives for one coordinator call. It is never stored with the
//! group; only its audit records outlive it.

use uuid::Uuid;

use crate::membership::MemberOperation;

use super::ids::{GroupId, RegionId};

/// A request to add or remove one region of a replication group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequest {
    /// Correlates the audit records of this request.
    pub request_id: Uuid,
    pub group_id: GroupId,
    pub region: RegionId,
    pub operation: MemberOperation,
    /// When set, the request only applies to this group version.
    pub expected_version: Option<u64>,
}

impl ChangeRequest {
    pub fn new(group_id: GroupId, region: RegionId, operation: MemberOperation) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            group_id,
            region,
            operation,
            expected_version: None,
        }
    }

    pub fn add(group_id: GroupId, region: RegionId) -> Self {
        Self::new(group_id, region, MemberOperation::Add)
    }

    pub fn remove(group_id: GroupId, region: RegionId) -> Self {
        Self::new(group_id, region, MemberOperation::Remove)
    }

    /// Pin the request to a group version.
    pub fn with_expected_version(mut self, version: Option<u64>) -> Self {
        self.expected_version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_get_distinct_ids() {
        let g = GroupId::new("orders").unwrap();
        let r = RegionId::new("us-east-1").unwrap();

        let a = ChangeRequest::add(g.clone(), r.clone());
        let b = ChangeRequest::remove(g, r).with_expected_version(Some(3));

        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.operation, MemberOperation::Add);
        assert_eq!(b.operation, MemberOperation::Remove);
        assert_eq!(b.expected_version, Some(3));
    }
}
