//! Membership driver
//!
//! Drives one member of one group until it settles. The driver keeps no
//! state of its own between steps: every step starts from a freshly
//! loaded snapshot, performs the region calls the member's state needs,
//! and commits the resulting transition as one compare-and-swap guarded
//! on the member's state and table handle. Any process can therefore pick
//! up a member where another left off.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::config::CoordinatorConfig;
use crate::crash_point::{maybe_crash, points};
use crate::group::{GroupId, Member, RegionId, ReplicationGroup};
use crate::observability::Event;
use crate::region::{RegionClient, RegionError, StreamPosition, TableHandle, TableStatus};
use crate::result::{EventNotifier, GroupEvent};
use crate::store::{CasOutcome, GroupStore};

use super::backoff::{retry_transient, Backoff};
use super::errors::{MembershipError, MembershipResult};
use super::state::MemberState;

/// Where a drive left the member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The member is ACTIVE or FAILED.
    Settled { state: MemberState, version: u64 },

    /// The member was dropped from the group by this drive.
    Removed { version: u64 },

    /// The member is not in the group; nothing to drive.
    Halted,

    /// The driver stopped with the member still in progress, after
    /// exhausting transient retries or its poll budget.
    Deferred { state: MemberState, reason: String },
}

impl DriveOutcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}

/// Result of one driver step.
enum Step {
    /// A commit landed or the member changed under us; re-evaluate.
    Continue,
    Done(DriveOutcome),
}

/// Result of a guarded commit.
enum Commit {
    Committed { version: u64 },
    /// The member no longer matches the guard.
    Superseded,
    /// The member is gone from the group.
    Vanished,
}

/// What a guarded commit expects to find before applying its change.
#[derive(Debug, Clone)]
struct Guard {
    state: MemberState,
    table_handle: Option<TableHandle>,
}

impl Guard {
    fn of(member: &Member) -> Self {
        Self {
            state: member.state,
            table_handle: member.table_handle.clone(),
        }
    }

    fn matches(&self, member: &Member) -> bool {
        member.state == self.state && member.table_handle == self.table_handle
    }
}

/// Drives members through their lifecycle against a store and a region
/// client.
pub struct MembershipDriver<S, R> {
    store: Arc<S>,
    client: Arc<R>,
    config: Arc<CoordinatorConfig>,
    notifier: EventNotifier,
}

impl<S, R> Clone for MembershipDriver<S, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
            config: Arc::clone(&self.config),
            notifier: self.notifier.clone(),
        }
    }
}

fn elapsed_in_state(member: &Member) -> Duration {
    member
        .time_in_state(Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

impl<S: GroupStore, R: RegionClient> MembershipDriver<S, R> {
    pub fn new(
        store: Arc<S>,
        client: Arc<R>,
        config: Arc<CoordinatorConfig>,
        notifier: EventNotifier,
    ) -> Self {
        Self {
            store,
            client,
            config,
            notifier,
        }
    }

    /// Drive the member until it settles, is removed, or must be deferred.
    #[instrument(skip_all, fields(group_id = %group_id, region = %region))]
    pub async fn drive(
        &self,
        group_id: &GroupId,
        region: &RegionId,
    ) -> MembershipResult<DriveOutcome> {
        loop {
            let group = self.store.load(group_id).await?;
            let Some(member) = group.member(region) else {
                debug!(event = %Event::MemberHalted, "member not in group");
                return Ok(DriveOutcome::Halted);
            };

            let step = match member.state {
                MemberState::Creating => self.step_create(&group, member).await?,
                MemberState::Bootstrapping => self.step_bootstrap(&group, member).await?,
                MemberState::Deleting => self.step_delete(&group, member).await?,
                MemberState::Active | MemberState::Failed => {
                    return Ok(DriveOutcome::Settled {
                        state: member.state,
                        version: group.version,
                    });
                }
                MemberState::Removed => {
                    // Never persisted; treat as gone.
                    return Ok(DriveOutcome::Halted);
                }
            };

            match step {
                Step::Continue => continue,
                Step::Done(outcome) => {
                    if let DriveOutcome::Deferred { state, reason } = &outcome {
                        warn!(
                            event = %Event::MemberDeferred,
                            state = %state,
                            reason = reason.as_str(),
                            "member deferred to reconciliation"
                        );
                    }
                    return Ok(outcome);
                }
            }
        }
    }

    /// CREATING: create the table, enable its stream, commit BOOTSTRAPPING.
    async fn step_create(&self, group: &ReplicationGroup, member: &Member) -> MembershipResult<Step> {
        let region = &member.region;
        let client = &*self.client;
        let schema = &group.table_schema;
        let guard = Guard::of(member);

        let handle = match retry_transient(&self.config.retry, "create_table", move || {
            client.create_table(region, schema)
        })
        .await
        {
            Ok(handle) => handle,
            Err(err) => return self.on_region_error(group, guard, err).await,
        };
        maybe_crash(points::DRIVER_AFTER_CREATE_TABLE);

        let stream_handle = &handle;
        let streamed = retry_transient(&self.config.retry, "enable_stream", move || {
            client.enable_stream(region, stream_handle)
        })
        .await;
        if let Err(err) = streamed {
            if err.is_transient() {
                return self.on_region_error(group, guard, err).await;
            }
            // Keep the table on the failed member so a REMOVE deletes it.
            return self
                .fail_with_table(&group.group_id, region, guard, err.message().to_string(), handle)
                .await;
        }

        let adopted = handle.clone();
        let commit = self
            .commit(&group.group_id, region, &guard, move |m| {
                m.table_handle = Some(adopted.clone());
                m.transition(MemberState::begin_bootstrap, Utc::now())
            })
            .await?;

        match commit {
            Commit::Committed { version } => {
                info!(
                    event = %Event::MemberBootstrapping,
                    version,
                    table_handle = %handle,
                    "member bootstrapping"
                );
                maybe_crash(points::DRIVER_AFTER_BOOTSTRAP_COMMIT);
                Ok(Step::Continue)
            }
            Commit::Superseded | Commit::Vanished => {
                self.settle_created_table(&group.group_id, region, handle).await
            }
        }
    }

    /// A table was created for a member that changed meanwhile. Hand the
    /// table to the member if it has none, or delete it if the member is
    /// gone.
    async fn settle_created_table(
        &self,
        group_id: &GroupId,
        region: &RegionId,
        handle: TableHandle,
    ) -> MembershipResult<Step> {
        loop {
            let group = self.store.load(group_id).await?;
            let Some(member) = group.member(region) else {
                self.delete_orphan(region, &handle).await;
                return Ok(Step::Done(DriveOutcome::Halted));
            };

            if member.table_handle.is_some() || member.state == MemberState::Creating {
                // The member owns a table already, or another driver is
                // still creating it and will get the same table back.
                return Ok(Step::Continue);
            }

            let guard = Guard::of(member);
            let adopted = handle.clone();
            match self
                .commit(group_id, region, &guard, move |m| {
                    m.table_handle = Some(adopted.clone());
                    Ok(())
                })
                .await?
            {
                Commit::Committed { version } => {
                    info!(
                        state = %guard.state,
                        version,
                        table_handle = %handle,
                        "table handle adopted by member"
                    );
                    return Ok(Step::Continue);
                }
                Commit::Superseded | Commit::Vanished => continue,
            }
        }
    }

    async fn delete_orphan(&self, region: &RegionId, handle: &TableHandle) {
        let client = &*self.client;
        match retry_transient(&self.config.retry, "delete_table", move || {
            client.delete_table(region, handle)
        })
        .await
        {
            Ok(()) => info!(
                event = %Event::OrphanTableDeleted,
                table_handle = %handle,
                "deleted table of vanished member"
            ),
            Err(err) => error!(
                table_handle = %handle,
                error = %err,
                "failed to delete table of vanished member"
            ),
        }
    }

    /// BOOTSTRAPPING: poll until the replica reaches the write frontier,
    /// then commit ACTIVE.
    async fn step_bootstrap(
        &self,
        group: &ReplicationGroup,
        member: &Member,
    ) -> MembershipResult<Step> {
        let guard = Guard::of(member);
        let Some(handle) = member.table_handle.clone() else {
            return self
                .fail(
                    &group.group_id,
                    &member.region,
                    guard,
                    "bootstrapping member has no table handle".into(),
                )
                .await;
        };

        let region = &member.region;
        let client = &*self.client;
        let retry = &self.config.retry;
        let timeout = self.config.bootstrap_timeout();
        let mut polls = Backoff::new(&self.config.poll);

        loop {
            // Reload so cancellation and peer changes are seen mid-bootstrap.
            let group = self.store.load(&group.group_id).await?;
            let Some(member) = group.member(region) else {
                return Ok(Step::Done(DriveOutcome::Halted));
            };
            if !guard.matches(member) {
                return Ok(Step::Continue);
            }

            if elapsed_in_state(member) >= timeout {
                let message = format!("bootstrap timed out after {}ms", timeout.as_millis());
                return self.fail(&group.group_id, region, guard, message).await;
            }

            let table = &handle;
            let status = match retry_transient(retry, "describe_table", move || {
                client.describe_table(region, table)
            })
            .await
            {
                Ok(status) => status,
                Err(err) => return self.on_region_error(&group, guard, err).await,
            };

            let waiting_on = match status {
                TableStatus::Creating => "table still creating".to_string(),
                TableStatus::Active => {
                    let position = match retry_transient(retry, "get_stream_position", move || {
                        client.get_stream_position(region, table)
                    })
                    .await
                    {
                        Ok(position) => position,
                        Err(err) => return self.on_region_error(&group, guard, err).await,
                    };

                    let frontier = match self.write_frontier(&group, region).await {
                        Ok(frontier) => frontier,
                        Err(err) => {
                            return Ok(Step::Done(DriveOutcome::Deferred {
                                state: MemberState::Bootstrapping,
                                reason: err.to_string(),
                            }))
                        }
                    };

                    match frontier {
                        Some(frontier) if !position.has_reached(frontier) => {
                            format!("replica at {}, frontier at {}", position, frontier)
                        }
                        _ => {
                            return self.activate(&group.group_id, region, guard, position).await;
                        }
                    }
                }
                TableStatus::Deleting | TableStatus::NotFound => {
                    let message = format!("table {} disappeared during bootstrap", handle);
                    return self.fail(&group.group_id, region, guard, message).await;
                }
            };

            let Some(delay) = polls.next_delay() else {
                return Ok(Step::Done(DriveOutcome::Deferred {
                    state: MemberState::Bootstrapping,
                    reason: waiting_on,
                }));
            };
            debug!(waiting_on = waiting_on.as_str(), delay_ms = delay.as_millis() as u64, "bootstrap poll");
            tokio::time::sleep(delay).await;
        }
    }

    async fn activate(
        &self,
        group_id: &GroupId,
        region: &RegionId,
        guard: Guard,
        position: StreamPosition,
    ) -> MembershipResult<Step> {
        maybe_crash(points::DRIVER_BEFORE_ACTIVATE_COMMIT);

        match self
            .commit(group_id, region, &guard, move |m| {
                m.stream_position = Some(position);
                m.transition(MemberState::activate, Utc::now())
            })
            .await?
        {
            Commit::Committed { version } => {
                info!(
                    event = %Event::MemberActivated,
                    version,
                    stream_position = %position,
                    "member activated"
                );
                Ok(Step::Continue)
            }
            Commit::Superseded => Ok(Step::Continue),
            Commit::Vanished => Ok(Step::Done(DriveOutcome::Halted)),
        }
    }

    /// Highest stream position among the group's other ACTIVE members, or
    /// `None` if there are none.
    ///
    /// A peer whose position cannot be read permanently is skipped; a
    /// transient failure is returned so the caller can defer.
    async fn write_frontier(
        &self,
        group: &ReplicationGroup,
        region: &RegionId,
    ) -> Result<Option<StreamPosition>, RegionError> {
        let client = &*self.client;
        let retry = &self.config.retry;

        let peers = group
            .members_in(MemberState::Active)
            .filter(|m| &m.region != region)
            .filter_map(|m| m.table_handle.as_ref().map(|h| (&m.region, h)));

        let mut frontier: Option<StreamPosition> = None;
        for (peer, handle) in peers {
            let read = retry_transient(retry, "get_stream_position", move || {
                client.get_stream_position(peer, handle)
            })
            .await;
            match read {
                Ok(position) => {
                    frontier = Some(frontier.map_or(position, |f| f.max(position)));
                }
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => warn!(
                    peer = %peer,
                    error = %err,
                    "skipping peer with unreadable stream position"
                ),
            }
        }
        Ok(frontier)
    }

    /// DELETING: delete the table, wait for NOT_FOUND, drop the member.
    async fn step_delete(&self, group: &ReplicationGroup, member: &Member) -> MembershipResult<Step> {
        let guard = Guard::of(member);
        let region = &member.region;

        if let Some(handle) = member.table_handle.clone() {
            if elapsed_in_state(member) >= self.config.deletion_timeout() {
                let message = format!(
                    "deletion timed out after {}ms",
                    self.config.deletion_timeout_ms
                );
                return self.fail(&group.group_id, region, guard, message).await;
            }
            if let Some(step) = self.delete_table(group, member, &handle).await? {
                return Ok(step);
            }
        }

        maybe_crash(points::DRIVER_BEFORE_REMOVE_COMMIT);

        match self
            .commit(&group.group_id, region, &guard, |m| {
                m.transition(MemberState::complete_delete, Utc::now())
            })
            .await?
        {
            Commit::Committed { version } => {
                info!(event = %Event::MemberRemoved, version, "member removed");
                Ok(Step::Done(DriveOutcome::Removed { version }))
            }
            Commit::Superseded => Ok(Step::Continue),
            Commit::Vanished => Ok(Step::Done(DriveOutcome::Halted)),
        }
    }

    /// Delete the regional table and poll until it is gone.
    ///
    /// Returns `Some(step)` when the drive must stop short of the removal
    /// commit.
    async fn delete_table(
        &self,
        group: &ReplicationGroup,
        member: &Member,
        handle: &TableHandle,
    ) -> MembershipResult<Option<Step>> {
        let region = &member.region;
        let client = &*self.client;
        let retry = &self.config.retry;
        let guard = Guard::of(member);

        if let Err(err) = retry_transient(retry, "delete_table", move || {
            client.delete_table(region, handle)
        })
        .await
        {
            return self.on_region_error(group, guard, err).await.map(Some);
        }
        maybe_crash(points::DRIVER_AFTER_DELETE_TABLE);

        let timeout = self.config.deletion_timeout();
        let mut polls = Backoff::new(&self.config.poll);
        loop {
            let status = match retry_transient(retry, "describe_table", move || {
                client.describe_table(region, handle)
            })
            .await
            {
                Ok(status) => status,
                Err(err) => return self.on_region_error(group, guard, err).await.map(Some),
            };
            if status == TableStatus::NotFound {
                return Ok(None);
            }

            if elapsed_in_state(member) >= timeout {
                let message = format!("deletion timed out after {}ms", timeout.as_millis());
                return self
                    .fail(&group.group_id, region, guard, message)
                    .await
                    .map(Some);
            }

            let Some(delay) = polls.next_delay() else {
                return Ok(Some(Step::Done(DriveOutcome::Deferred {
                    state: MemberState::Deleting,
                    reason: format!("table {} still {:?}", handle, status),
                })));
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// Permanent errors fail the member; exhausted transient retries defer.
    async fn on_region_error(
        &self,
        group: &ReplicationGroup,
        guard: Guard,
        err: RegionError,
    ) -> MembershipResult<Step> {
        if err.is_transient() {
            return Ok(Step::Done(DriveOutcome::Deferred {
                state: guard.state,
                reason: err.to_string(),
            }));
        }
        let region = err.region().clone();
        self.fail(&group.group_id, &region, guard, err.message().to_string())
            .await
    }

    async fn fail(
        &self,
        group_id: &GroupId,
        region: &RegionId,
        guard: Guard,
        message: String,
    ) -> MembershipResult<Step> {
        self.commit_failure(group_id, region, guard, message, None)
            .await
    }

    async fn fail_with_table(
        &self,
        group_id: &GroupId,
        region: &RegionId,
        guard: Guard,
        message: String,
        handle: TableHandle,
    ) -> MembershipResult<Step> {
        self.commit_failure(group_id, region, guard, message, Some(handle))
            .await
    }

    async fn commit_failure(
        &self,
        group_id: &GroupId,
        region: &RegionId,
        guard: Guard,
        message: String,
        handle: Option<TableHandle>,
    ) -> MembershipResult<Step> {
        let from = guard.state;
        let last_error = message.clone();
        match self
            .commit(group_id, region, &guard, move |m| {
                m.transition(MemberState::fail, Utc::now())?;
                m.last_error = Some(last_error.clone());
                if m.table_handle.is_none() {
                    m.table_handle = handle.clone();
                }
                Ok(())
            })
            .await?
        {
            Commit::Committed { version } => {
                error!(
                    event = %Event::MemberFailed,
                    from = %from,
                    version,
                    error = message.as_str(),
                    "member failed"
                );
                Ok(Step::Continue)
            }
            Commit::Superseded => Ok(Step::Continue),
            Commit::Vanished => Ok(Step::Done(DriveOutcome::Halted)),
        }
    }

    /// Apply `change` to the member and commit it, provided the member
    /// still matches `guard`.
    ///
    /// CAS conflicts are retried against a fresh snapshot up to
    /// `max_cas_retries` times. A member whose state becomes REMOVED is
    /// dropped from the group in the same commit.
    async fn commit<F>(
        &self,
        group_id: &GroupId,
        region: &RegionId,
        guard: &Guard,
        change: F,
    ) -> MembershipResult<Commit>
    where
        F: Fn(&mut Member) -> MembershipResult<()> + Send,
    {
        let attempts = self.config.max_cas_retries;
        for _ in 0..attempts {
            let mut group = self.store.load(group_id).await?;
            let expected_version = group.version;

            let Some(member) = group.member_mut(region) else {
                return Ok(Commit::Vanished);
            };
            if !guard.matches(member) {
                return Ok(Commit::Superseded);
            }

            change(member)?;
            let new_state = member.state;
            if new_state == MemberState::Removed {
                group.members.remove(region);
            }
            group.updated_at = Utc::now();

            match self
                .store
                .compare_and_swap(group_id, expected_version, group)
                .await?
            {
                CasOutcome::Committed { version } => {
                    let event = if new_state == MemberState::Removed {
                        GroupEvent::MemberRemoved {
                            group_id: group_id.clone(),
                            region: region.clone(),
                            version,
                        }
                    } else {
                        GroupEvent::MemberStateChanged {
                            group_id: group_id.clone(),
                            region: region.clone(),
                            from: Some(guard.state),
                            to: new_state,
                            version,
                        }
                    };
                    self.notifier.publish(event);

                    return Ok(Commit::Committed { version });
                }
                CasOutcome::Conflict { current_version } => {
                    debug!(
                        event = %Event::CasConflict,
                        expected_version,
                        current_version,
                        "commit lost to concurrent writer, reloading"
                    );
                }
            }
        }

        Err(MembershipError::cas_retries_exhausted(
            group_id.as_str(),
            attempts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{InMemoryRegionClient, RegionCall, TableSchema};
    use crate::store::MemoryGroupStore;

    struct Fixture {
        store: Arc<MemoryGroupStore>,
        client: Arc<InMemoryRegionClient>,
        driver: MembershipDriver<MemoryGroupStore, InMemoryRegionClient>,
        group_id: GroupId,
    }

    fn region(code: &str) -> RegionId {
        RegionId::new(code).unwrap()
    }

    async fn fixture(config: CoordinatorConfig) -> Fixture {
        let store = Arc::new(MemoryGroupStore::new());
        let client = Arc::new(InMemoryRegionClient::new());
        let group_id = GroupId::new("orders").unwrap();
        store
            .create(ReplicationGroup::new(
                group_id.clone(),
                TableSchema::new("orders", "pk"),
                Utc::now(),
            ))
            .await
            .unwrap();

        let driver = MembershipDriver::new(
            Arc::clone(&store),
            Arc::clone(&client),
            Arc::new(config),
            EventNotifier::new(64),
        );
        Fixture {
            store,
            client,
            driver,
            group_id,
        }
    }

    impl Fixture {
        async fn put_member(&self, member: Member) {
            let mut group = self.store.load(&self.group_id).await.unwrap();
            let version = group.version;
            group.members.insert(member.region.clone(), member);
            self.store
                .compare_and_swap(&self.group_id, version, group)
                .await
                .unwrap();
        }

        async fn member(&self, code: &str) -> Option<Member> {
            self.store
                .load(&self.group_id)
                .await
                .unwrap()
                .member(&region(code))
                .cloned()
        }
    }

    #[tokio::test]
    async fn test_drive_add_to_active() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        f.put_member(Member::for_add(region("us-east-1"), Utc::now()))
            .await;

        let outcome = f.driver.drive(&f.group_id, &region("us-east-1")).await.unwrap();

        // v1 CREATING, v2 BOOTSTRAPPING, v3 ACTIVE
        assert_eq!(
            outcome,
            DriveOutcome::Settled {
                state: MemberState::Active,
                version: 3
            }
        );
        let member = f.member("us-east-1").await.unwrap();
        assert!(member.table_handle.is_some());
        assert!(member.stream_position.is_some());
    }

    #[tokio::test]
    async fn test_second_member_catches_up_to_frontier() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        f.client.set_write_frontier(10).await;
        f.client.set_catch_up_step(3).await;

        f.put_member(Member::for_add(region("us-east-1"), Utc::now()))
            .await;
        f.driver.drive(&f.group_id, &region("us-east-1")).await.unwrap();

        f.put_member(Member::for_add(region("eu-west-1"), Utc::now()))
            .await;
        let outcome = f.driver.drive(&f.group_id, &region("eu-west-1")).await.unwrap();

        assert!(matches!(
            outcome,
            DriveOutcome::Settled {
                state: MemberState::Active,
                ..
            }
        ));
        let peer = f.member("us-east-1").await.unwrap();
        let member = f.member("eu-west-1").await.unwrap();
        assert!(member.stream_position.unwrap().value() >= peer.stream_position.unwrap().value());
        assert!(
            f.client
                .call_count(&region("eu-west-1"), RegionCall::GetStreamPosition)
                .await
                > 1
        );
    }

    #[tokio::test]
    async fn test_permanent_error_fails_member() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        f.client
            .fail_permanent(&region("ap-south-1"), RegionCall::CreateTable, "quota exceeded")
            .await;
        f.put_member(Member::for_add(region("ap-south-1"), Utc::now()))
            .await;

        let outcome = f.driver.drive(&f.group_id, &region("ap-south-1")).await.unwrap();

        assert!(matches!(
            outcome,
            DriveOutcome::Settled {
                state: MemberState::Failed,
                ..
            }
        ));
        let member = f.member("ap-south-1").await.unwrap();
        assert_eq!(member.last_error.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn test_transient_exhaustion_defers_without_state_change() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        f.client
            .fail_transient(&region("us-west-2"), RegionCall::CreateTable, 100)
            .await;
        f.put_member(Member::for_add(region("us-west-2"), Utc::now()))
            .await;

        let outcome = f.driver.drive(&f.group_id, &region("us-west-2")).await.unwrap();

        assert!(outcome.is_deferred());
        assert_eq!(
            f.member("us-west-2").await.unwrap().state,
            MemberState::Creating
        );
    }

    #[tokio::test]
    async fn test_bootstrap_timeout_fails_member() {
        let config = CoordinatorConfig {
            bootstrap_timeout_ms: 1,
            ..CoordinatorConfig::immediate()
        };
        let f = fixture(config).await;
        let mut member = Member::for_add(region("us-east-2"), Utc::now() - chrono::Duration::seconds(1));
        member.state = MemberState::Bootstrapping;
        member.table_handle = Some(TableHandle::new("arn:aws:dynamodb:us-east-2:000000000000:table/orders"));
        f.put_member(member).await;

        let outcome = f.driver.drive(&f.group_id, &region("us-east-2")).await.unwrap();

        assert!(matches!(
            outcome,
            DriveOutcome::Settled {
                state: MemberState::Failed,
                ..
            }
        ));
        let member = f.member("us-east-2").await.unwrap();
        assert!(member.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_drive_delete_removes_member_and_table() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        f.client.set_deletion_polls(2).await;
        f.put_member(Member::for_add(region("us-east-1"), Utc::now()))
            .await;
        f.driver.drive(&f.group_id, &region("us-east-1")).await.unwrap();

        let mut group = f.store.load(&f.group_id).await.unwrap();
        let version = group.version;
        group
            .member_mut(&region("us-east-1"))
            .unwrap()
            .transition(MemberState::begin_delete, Utc::now())
            .unwrap();
        f.store
            .compare_and_swap(&f.group_id, version, group)
            .await
            .unwrap();

        let outcome = f.driver.drive(&f.group_id, &region("us-east-1")).await.unwrap();

        assert_eq!(outcome, DriveOutcome::Removed { version: version + 2 });
        assert!(f.member("us-east-1").await.is_none());
        assert!(!f.client.table_exists(&region("us-east-1"), "orders").await);
    }

    #[tokio::test]
    async fn test_deleting_member_without_table_is_removed() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        let mut member = Member::for_add(region("eu-central-1"), Utc::now());
        member.state = MemberState::Deleting;
        f.put_member(member).await;

        let outcome = f.driver.drive(&f.group_id, &region("eu-central-1")).await.unwrap();

        assert_eq!(outcome, DriveOutcome::Removed { version: 2 });
        assert_eq!(
            f.client
                .call_count(&region("eu-central-1"), RegionCall::DeleteTable)
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_cancelled_member_adopts_created_table() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        let handle = f
            .client
            .seed_table(&region("eu-central-1"), &TableSchema::new("orders", "pk"))
            .await;
        // Cancelled before the creating driver could record its table.
        let mut member = Member::for_add(region("eu-central-1"), Utc::now());
        member.state = MemberState::Deleting;
        f.put_member(member).await;

        let step = f
            .driver
            .settle_created_table(&f.group_id, &region("eu-central-1"), handle.clone())
            .await
            .unwrap();
        assert!(matches!(step, Step::Continue));
        assert_eq!(
            f.member("eu-central-1").await.unwrap().table_handle,
            Some(handle)
        );

        let outcome = f.driver.drive(&f.group_id, &region("eu-central-1")).await.unwrap();
        assert!(matches!(outcome, DriveOutcome::Removed { .. }));
        assert!(!f.client.table_exists(&region("eu-central-1"), "orders").await);
    }

    #[tokio::test]
    async fn test_table_of_vanished_member_is_deleted() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        let handle = f
            .client
            .seed_table(&region("sa-east-1"), &TableSchema::new("orders", "pk"))
            .await;

        let step = f
            .driver
            .settle_created_table(&f.group_id, &region("sa-east-1"), handle.clone())
            .await
            .unwrap();

        assert!(matches!(step, Step::Done(DriveOutcome::Halted)));
        assert_eq!(
            f.client
                .describe_table(&region("sa-east-1"), &handle)
                .await
                .unwrap(),
            TableStatus::NotFound
        );
    }

    #[tokio::test]
    async fn test_absent_member_halts() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        let outcome = f.driver.drive(&f.group_id, &region("us-east-1")).await.unwrap();
        assert_eq!(outcome, DriveOutcome::Halted);
    }

    #[tokio::test]
    async fn test_settled_member_is_left_alone() {
        let f = fixture(CoordinatorConfig::immediate()).await;
        let mut member = Member::for_add(region("us-east-1"), Utc::now());
        member.state = MemberState::Failed;
        f.put_member(member).await;

        let outcome = f.driver.drive(&f.group_id, &region("us-east-1")).await.unwrap();

        assert_eq!(
            outcome,
            DriveOutcome::Settled {
                state: MemberState::Failed,
                version: 1
            }
        );
        assert_eq!(
            f.client
                .call_count(&region("us-east-1"), RegionCall::CreateTable)
                .await,
            0
        );
    }
}
