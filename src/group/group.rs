use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::membership::MemberState;
use crate::region::TableSchema;

use super::ids::{GroupId, RegionId};
use super::member::Member;

/// The set of regional replicas of one logical table.
///
/// A `ReplicationGroup` value is always a snapshot: the group state store
/// owns the persisted copy and assigns `version` on every committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationGroup {
    pub group_id: GroupId,
    pub table_schema: TableSchema,
    /// Incremented by one on every committed write; 0 at creation.
    pub version: u64,
    pub members: BTreeMap<RegionId, Member>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReplicationGroup {
    /// An empty group at version 0.
    pub fn new(group_id: GroupId, table_schema: TableSchema, now: DateTime<Utc>) -> Self {
        Self {
            group_id,
            table_schema,
            version: 0,
            members: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn member(&self, region: &RegionId) -> Option<&Member> {
        self.members.get(region)
    }

    pub fn member_mut(&mut self, region: &RegionId) -> Option<&mut Member> {
        self.members.get_mut(region)
    }

    pub fn contains(&self, region: &RegionId) -> bool {
        self.members.contains_key(region)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in the given state, in region order.
    pub fn members_in(&self, state: MemberState) -> impl Iterator<Item = &Member> {
        self.members.values().filter(move |m| m.state == state)
    }

    /// Members a driver still has work to do on.
    pub fn in_progress_members(&self) -> impl Iterator<Item = &Member> {
        self.members.values().filter(|m| m.state.is_in_progress())
    }

    /// Regions currently in the group, in order.
    pub fn regions(&self) -> Vec<RegionId> {
        self.members.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_with(states: &[(&str, MemberState)]) -> ReplicationGroup {
        let now = Utc::now();
        let mut group = ReplicationGroup::new(
            GroupId::new("orders").unwrap(),
            TableSchema::new("orders", "pk"),
            now,
        );
        for (region, state) in states {
            let region = RegionId::new(*region).unwrap();
            let mut member = Member::for_add(region.clone(), now);
            member.state = *state;
            group.members.insert(region, member);
        }
        group
    }

    #[test]
    fn test_new_group_is_empty_at_version_zero() {
        let group = group_with(&[]);
        assert_eq!(group.version, 0);
        assert!(group.is_empty());
    }

    #[test]
    fn test_member_queries() {
        let group = group_with(&[
            ("us-east-1", MemberState::Active),
            ("eu-west-1", MemberState::Bootstrapping),
            ("ap-south-1", MemberState::Failed),
        ]);

        let active: Vec<_> = group
            .members_in(MemberState::Active)
            .map(|m| m.region.as_str())
            .collect();
        assert_eq!(active, vec!["us-east-1"]);

        let in_progress: Vec<_> = group
            .in_progress_members()
            .map(|m| m.region.as_str())
            .collect();
        assert_eq!(in_progress, vec!["eu-west-1"]);

        let regions: Vec<_> = group.regions().into_iter().map(String::from).collect();
        assert_eq!(regions, vec!["ap-south-1", "eu-west-1", "us-east-1"]);
    }

    #[test]
    fn test_json_round_trip() {
        let group = group_with(&[("us-east-1", MemberState::Active)]);
        let json = serde_json::to_string(&group).unwrap();
        assert!(json.contains("\"us-east-1\""));
        let back: ReplicationGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, group);
    }
}
