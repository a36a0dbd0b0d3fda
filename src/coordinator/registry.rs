use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::group::{GroupId, RegionId};

type MemberKey = (GroupId, RegionId);

#[derive(Debug, Default)]
struct Inner {
    driving: Mutex<HashSet<MemberKey>>,
    released: Notify,
}

impl Inner {
    fn driving(&self) -> MutexGuard<'_, HashSet<MemberKey>> {
        // The set is valid after any panic; recover it.
        self.driving.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Members currently being driven by a task of this process.
///
/// Keeps two tasks of one process from driving the same member at once.
/// Drivers in other processes are kept consistent by the store's CAS, not
/// by this registry.
#[derive(Debug, Clone, Default)]
pub struct DriveRegistry {
    inner: Arc<Inner>,
}

/// Exclusive claim on driving one member. Released on drop.
#[derive(Debug)]
pub struct DriveGuard {
    inner: Arc<Inner>,
    key: MemberKey,
}

impl DriveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the member, or `None` if another task is driving it.
    pub fn try_acquire(&self, group_id: &GroupId, region: &RegionId) -> Option<DriveGuard> {
        let key = (group_id.clone(), region.clone());
        if !self.inner.driving().insert(key.clone()) {
            return None;
        }
        Some(DriveGuard {
            inner: Arc::clone(&self.inner),
            key,
        })
    }

    /// Claim the member, waiting for the current driver to finish.
    pub async fn acquire(&self, group_id: &GroupId, region: &RegionId) -> DriveGuard {
        loop {
            // Created before the check so a release in between is not missed.
            let released = self.inner.released.notified();
            if let Some(guard) = self.try_acquire(group_id, region) {
                return guard;
            }
            released.await;
        }
    }

    pub fn is_driving(&self, group_id: &GroupId, region: &RegionId) -> bool {
        self.inner
            .driving()
            .contains(&(group_id.clone(), region.clone()))
    }

    pub fn len(&self) -> usize {
        self.inner.driving().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for DriveGuard {
    fn drop(&mut self) {
        self.inner.driving().remove(&self.key);
        self.inner.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key() -> (GroupId, RegionId) {
        (
            GroupId::new("orders").unwrap(),
            RegionId::new("us-east-1").unwrap(),
        )
    }

    #[test]
    fn test_second_claim_is_refused() {
        let registry = DriveRegistry::new();
        let (g, r) = key();

        let guard = registry.try_acquire(&g, &r).unwrap();
        assert!(registry.try_acquire(&g, &r).is_none());
        assert!(registry.is_driving(&g, &r));

        drop(guard);
        assert!(registry.is_empty());
        assert!(registry.try_acquire(&g, &r).is_some());
    }

    #[test]
    fn test_different_members_are_independent() {
        let registry = DriveRegistry::new();
        let (g, r) = key();
        let other = RegionId::new("eu-west-1").unwrap();

        let _a = registry.try_acquire(&g, &r).unwrap();
        let _b = registry.try_acquire(&g, &other).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let registry = DriveRegistry::new();
        let (g, r) = key();
        let guard = registry.try_acquire(&g, &r).unwrap();

        let waiter = {
            let registry = registry.clone();
            let (g, r) = (g.clone(), r.clone());
            tokio::spawn(async move {
                let _guard = registry.acquire(&g, &r).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(registry.is_empty());
    }
}
