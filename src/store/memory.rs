use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::group::{GroupId, ReplicationGroup};

use super::base::{CasOutcome, GroupStore};
use super::errors::{StoreError, StoreResult};

/// Group store held entirely in process memory.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryGroupStore {
    groups: Arc<Mutex<BTreeMap<GroupId, ReplicationGroup>>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a group without a version check.
    ///
    /// Test helper for seeding state left behind by another process.
    pub async fn put_unchecked(&self, group: ReplicationGroup) {
        self.groups.lock().await.insert(group.group_id.clone(), group);
    }
}

impl GroupStore for MemoryGroupStore {
    async fn create(&self, mut group: ReplicationGroup) -> StoreResult<()> {
        let mut groups = self.groups.lock().await;
        if groups.contains_key(&group.group_id) {
            return Err(StoreError::GroupAlreadyExists(group.group_id));
        }
        group.version = 0;
        groups.insert(group.group_id.clone(), group);
        Ok(())
    }

    async fn load(&self, group_id: &GroupId) -> StoreResult<ReplicationGroup> {
        self.groups
            .lock()
            .await
            .get(group_id)
            .cloned()
            .ok_or_else(|| StoreError::GroupNotFound(group_id.clone()))
    }

    async fn compare_and_swap(
        &self,
        group_id: &GroupId,
        expected_version: u64,
        mut group: ReplicationGroup,
    ) -> StoreResult<CasOutcome> {
        if &group.group_id != group_id {
            return Err(StoreError::GroupIdMismatch {
                expected: group_id.clone(),
                found: group.group_id,
            });
        }

        let mut groups = self.groups.lock().await;
        let current = groups
            .get(group_id)
            .ok_or_else(|| StoreError::GroupNotFound(group_id.clone()))?;
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict {
                current_version: current.version,
            });
        }

        let version = expected_version + 1;
        group.version = version;
        groups.insert(group_id.clone(), group);
        Ok(CasOutcome::Committed { version })
    }

    async fn delete(&self, group_id: &GroupId, expected_version: u64) -> StoreResult<CasOutcome> {
        let mut groups = self.groups.lock().await;
        let current = groups
            .get(group_id)
            .ok_or_else(|| StoreError::GroupNotFound(group_id.clone()))?;
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict {
                current_version: current.version,
            });
        }
        groups.remove(group_id);
        Ok(CasOutcome::Committed {
            version: expected_version,
        })
    }

    async fn list_group_ids(&self) -> StoreResult<Vec<GroupId>> {
        Ok(self.groups.lock().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::TableSchema;
    use chrono::Utc;

    fn group(id: &str) -> ReplicationGroup {
        ReplicationGroup::new(
            GroupId::new(id).unwrap(),
            TableSchema::new("orders", "pk"),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let store = MemoryGroupStore::new();
        store.create(group("g1")).await.unwrap();

        let loaded = store.load(&GroupId::new("g1").unwrap()).await.unwrap();
        assert_eq!(loaded.version, 0);

        let err = store.create(group("g1")).await.unwrap_err();
        assert!(matches!(err, StoreError::GroupAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_cas_bumps_version_by_one() {
        let store = MemoryGroupStore::new();
        let id = GroupId::new("g1").unwrap();
        store.create(group("g1")).await.unwrap();

        let outcome = store.compare_and_swap(&id, 0, group("g1")).await.unwrap();
        assert_eq!(outcome, CasOutcome::Committed { version: 1 });
        assert_eq!(store.load(&id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_stale_cas_conflicts() {
        let store = MemoryGroupStore::new();
        let id = GroupId::new("g1").unwrap();
        store.create(group("g1")).await.unwrap();
        store.compare_and_swap(&id, 0, group("g1")).await.unwrap();

        let outcome = store.compare_and_swap(&id, 0, group("g1")).await.unwrap();
        assert_eq!(outcome, CasOutcome::Conflict { current_version: 1 });
    }

    #[tokio::test]
    async fn test_cas_rejects_foreign_group() {
        let store = MemoryGroupStore::new();
        let id = GroupId::new("g1").unwrap();
        store.create(group("g1")).await.unwrap();

        let err = store.compare_and_swap(&id, 0, group("g2")).await.unwrap_err();
        assert!(matches!(err, StoreError::GroupIdMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = MemoryGroupStore::new();
        store.create(group("b")).await.unwrap();
        store.create(group("a")).await.unwrap();

        let ids: Vec<_> = store
            .list_group_ids()
            .await
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        let a = GroupId::new("a").unwrap();
        assert_eq!(
            store.delete(&a, 3).await.unwrap(),
            CasOutcome::Conflict { current_version: 0 }
        );
        assert!(store.delete(&a, 0).await.unwrap().is_committed());
        assert!(store.load(&a).await.unwrap_err().is_not_found());
    }
}
