//! Reconciliation Crash Tests
//!
//! A driver that dies between a region call and the commit recording it
//! leaves the group mid-transition. These tests check that the sweep
//! repairs such groups without operator input:
//! - a member left CREATING or BOOTSTRAPPING reaches ACTIVE or FAILED
//! - a member left DELETING is removed
//! - a member that cannot make progress is reported as stalled
//!
//! The crash tests re-run this test binary as a child process with
//! `REPLGROUP_CRASH_POINT` set, so the child aborts for real and leaves
//! its file-backed store behind.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use replgroup::config::CoordinatorConfig;
use replgroup::coordinator::{CoordinatorError, GroupCoordinator};
use replgroup::crash_point::points;
use replgroup::membership::{MemberOperation, MemberState};
use replgroup::observability::init_test_tracing;
use replgroup::region::{InMemoryRegionClient, RegionCall, TableHandle, TableSchema};
use replgroup::store::{FileGroupStore, GroupStore, MemoryGroupStore};
use replgroup::{GroupId, Member, RegionId};

const CHILD_DIR_VAR: &str = "REPLGROUP_CRASH_TEST_DIR";
const CHILD_ACTION_VAR: &str = "REPLGROUP_CRASH_TEST_ACTION";

fn sweep_config() -> CoordinatorConfig {
    init_test_tracing();
    let mut config = CoordinatorConfig::immediate();
    config.reconciliation.staleness_threshold_ms = 0;
    config.reconciliation.max_stalled_sweeps = 3;
    config
}

fn schema() -> TableSchema {
    TableSchema::new("orders", "pk")
}

fn region(code: &str) -> RegionId {
    RegionId::new(code).unwrap()
}

// =============================================================================
// Child Process
// =============================================================================

/// Body of the crashing child. Does nothing unless started by
/// `run_child_until_crash`.
#[tokio::test]
async fn crash_child_process() {
    let (Ok(dir), Ok(action)) = (std::env::var(CHILD_DIR_VAR), std::env::var(CHILD_ACTION_VAR))
    else {
        return;
    };

    let store = Arc::new(FileGroupStore::open(&dir).await.unwrap());
    let client = Arc::new(InMemoryRegionClient::new());
    let coordinator = GroupCoordinator::new(store, client, CoordinatorConfig::immediate()).unwrap();

    match action.as_str() {
        "add" => {
            coordinator.create_group("orders", schema()).await.unwrap();
            let _ = coordinator.add_member("orders", "us-east-1", None).await;
        }
        "remove" => {
            let _ = coordinator.remove_member("orders", "us-east-1", None).await;
        }
        other => panic!("unknown child action {other}"),
    }
}

/// Run the child with `crash_point` armed and assert that it aborted.
fn run_child_until_crash(dir: &Path, action: &str, crash_point: &str) {
    let exe = std::env::current_exe().unwrap();
    let output = Command::new(exe)
        .args(["crash_child_process", "--exact", "--nocapture", "--test-threads=1"])
        .env("REPLGROUP_CRASH_POINT", crash_point)
        .env(CHILD_DIR_VAR, dir)
        .env(CHILD_ACTION_VAR, action)
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "child survived {crash_point}");
    assert!(
        stderr.contains(&format!("[CRASH] Triggering crash at point: {crash_point}")),
        "child did not reach {crash_point}: {stderr}"
    );
}

async fn recover(
    dir: &Path,
    client: Arc<InMemoryRegionClient>,
) -> GroupCoordinator<FileGroupStore, InMemoryRegionClient> {
    let store = Arc::new(FileGroupStore::open(dir).await.unwrap());
    GroupCoordinator::new(store, client, sweep_config()).unwrap()
}

// =============================================================================
// Crash Points on the ADD Path
// =============================================================================

/// Crash right after the request's CREATING commit: the sweep creates the
/// table and activates the member.
#[tokio::test]
async fn test_crash_after_request_commit() {
    let dir = TempDir::new().unwrap();
    run_child_until_crash(dir.path(), "add", points::COORDINATOR_AFTER_REQUEST_COMMIT);

    let client = Arc::new(InMemoryRegionClient::new());
    let coordinator = recover(dir.path(), Arc::clone(&client)).await;
    let before = coordinator.describe_group("orders").await.unwrap();
    assert_eq!(before.version, 1);
    assert_eq!(
        before.member(&region("us-east-1")).unwrap().state,
        MemberState::Creating
    );

    let report = coordinator.reconciliation_sweep().sweep_once().await.unwrap();
    assert_eq!(report.settled, 1);

    let after = coordinator.describe_group("orders").await.unwrap();
    assert_eq!(after.version, 3);
    assert_eq!(
        after.member(&region("us-east-1")).unwrap().state,
        MemberState::Active
    );
}

/// Crash right after the BOOTSTRAPPING commit: the table still exists in
/// the region, and the sweep activates the member at the next version.
#[tokio::test]
async fn test_crash_after_bootstrap_commit() {
    let dir = TempDir::new().unwrap();
    run_child_until_crash(dir.path(), "add", points::DRIVER_AFTER_BOOTSTRAP_COMMIT);

    let client = Arc::new(InMemoryRegionClient::new());
    let handle = client.seed_table(&region("us-east-1"), &schema()).await;
    let coordinator = recover(dir.path(), Arc::clone(&client)).await;

    let before = coordinator.describe_group("orders").await.unwrap();
    let member = before.member(&region("us-east-1")).unwrap();
    assert_eq!(before.version, 2);
    assert_eq!(member.state, MemberState::Bootstrapping);
    assert_eq!(member.table_handle.as_ref(), Some(&handle));

    coordinator.reconciliation_sweep().sweep_once().await.unwrap();

    let after = coordinator.describe_group("orders").await.unwrap();
    assert_eq!(after.version, 3);
    assert_eq!(
        after.member(&region("us-east-1")).unwrap().state,
        MemberState::Active
    );
}

/// Crash after the bootstrap commit, with the table lost in the region
/// meanwhile: the sweep fails the member instead of waiting forever.
#[tokio::test]
async fn test_crash_with_lost_table_fails_member() {
    let dir = TempDir::new().unwrap();
    run_child_until_crash(dir.path(), "add", points::DRIVER_AFTER_BOOTSTRAP_COMMIT);

    let client = Arc::new(InMemoryRegionClient::new());
    let coordinator = recover(dir.path(), client).await;
    coordinator.reconciliation_sweep().sweep_once().await.unwrap();

    let group = coordinator.describe_group("orders").await.unwrap();
    let member = group.member(&region("us-east-1")).unwrap();
    assert_eq!(member.state, MemberState::Failed);
    assert!(member.last_error.is_some());
}

// =============================================================================
// Crash Points on the REMOVE Path
// =============================================================================

/// Crash after the table was deleted but before the removal commit: the
/// sweep finishes the removal.
#[tokio::test]
async fn test_crash_before_remove_commit() {
    let dir = TempDir::new().unwrap();
    {
        // The ADD completes in this process; only the REMOVE crashes.
        let client = Arc::new(InMemoryRegionClient::new());
        let coordinator = recover(dir.path(), client).await;
        coordinator.create_group("orders", schema()).await.unwrap();
        coordinator.add_member("orders", "us-east-1", None).await.unwrap();
    }
    run_child_until_crash(dir.path(), "remove", points::DRIVER_BEFORE_REMOVE_COMMIT);

    let client = Arc::new(InMemoryRegionClient::new());
    let coordinator = recover(dir.path(), Arc::clone(&client)).await;
    let before = coordinator.describe_group("orders").await.unwrap();
    assert_eq!(before.version, 4);
    assert_eq!(
        before.member(&region("us-east-1")).unwrap().state,
        MemberState::Deleting
    );

    let report = coordinator.reconciliation_sweep().sweep_once().await.unwrap();
    assert_eq!(report.removed, 1);

    let after = coordinator.describe_group("orders").await.unwrap();
    assert!(after.is_empty());
    assert_eq!(after.version, 5);
}

// =============================================================================
// In-Process Recovery
// =============================================================================

async fn seeded(
    member: Member,
    client: Arc<InMemoryRegionClient>,
) -> GroupCoordinator<MemoryGroupStore, InMemoryRegionClient> {
    let store = Arc::new(MemoryGroupStore::new());
    let coordinator = GroupCoordinator::new(Arc::clone(&store), client, sweep_config()).unwrap();
    coordinator.create_group("orders", schema()).await.unwrap();

    let group_id = GroupId::new("orders").unwrap();
    let mut group = store.load(&group_id).await.unwrap();
    group.members.insert(member.region.clone(), member);
    group.version = 7;
    store.put_unchecked(group).await;
    coordinator
}

/// A BOOTSTRAPPING member whose table exists is activated at the next
/// version.
#[tokio::test]
async fn test_sweep_activates_bootstrapping_member() {
    let r = region("eu-west-1");
    let client = Arc::new(InMemoryRegionClient::new());
    let handle = client.seed_table(&r, &schema()).await;

    let mut member = Member::for_add(r.clone(), Utc::now());
    member.state = MemberState::Bootstrapping;
    member.table_handle = Some(handle);
    let coordinator = seeded(member, client).await;

    let report = coordinator.reconciliation_sweep().sweep_once().await.unwrap();
    assert_eq!(report.members_resumed, 1);
    assert_eq!(report.settled, 1);

    let group = coordinator.describe_group("orders").await.unwrap();
    assert_eq!(group.version, 8);
    assert_eq!(group.member(&r).unwrap().state, MemberState::Active);
}

/// A DELETING member whose table is already gone is removed without
/// another delete call.
#[tokio::test]
async fn test_sweep_removes_deleting_member() {
    let r = region("eu-west-1");
    let mut member = Member::for_add(r.clone(), Utc::now());
    member.operation = MemberOperation::Remove;
    member.state = MemberState::Deleting;
    member.table_handle = Some(TableHandle::new("arn:gone"));
    let client = Arc::new(InMemoryRegionClient::new());
    let coordinator = seeded(member, Arc::clone(&client)).await;

    let report = coordinator.reconciliation_sweep().sweep_once().await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(coordinator.describe_group("orders").await.unwrap().is_empty());
    assert_eq!(client.call_count(&r, RegionCall::DeleteTable).await, 1);
}

/// A member whose region keeps throttling is reported as stalled once it
/// has made no progress for the configured number of sweeps, and is left
/// in its state.
#[tokio::test]
async fn test_member_without_progress_is_reported_stalled() {
    let r = region("ap-south-1");
    let member = Member::for_add(r.clone(), Utc::now());
    let client = Arc::new(InMemoryRegionClient::new());
    let coordinator = seeded(member, Arc::clone(&client)).await;
    client.fail_transient(&r, RegionCall::CreateTable, u32::MAX).await;

    let sweep = coordinator.reconciliation_sweep();
    for _ in 0..2 {
        let report = sweep.sweep_once().await.unwrap();
        assert_eq!(report.deferred, 1);
        assert!(report.stalled.is_empty());
    }

    let report = sweep.sweep_once().await.unwrap();
    assert_eq!(report.stalled.len(), 1);
    let stalled = &report.stalled[0];
    assert_eq!(stalled.region, r);
    assert_eq!(stalled.state, MemberState::Creating);
    assert!(matches!(
        stalled.to_error(),
        CoordinatorError::ReconciliationStalled { attempts: 3, .. }
    ));

    let group = coordinator.describe_group("orders").await.unwrap();
    assert_eq!(group.member(&r).unwrap().state, MemberState::Creating);
    assert_eq!(group.version, 7);
}
