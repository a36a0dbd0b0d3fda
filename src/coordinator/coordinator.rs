use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::CoordinatorConfig;
use crate::crash_point::{maybe_crash, points};
use crate::group::{ChangeRequest, GroupId, Member, RegionId, ReplicationGroup};
use crate::membership::{DriveOutcome, MemberOperation, MemberState, MembershipDriver};
use crate::observability::{
    open_audit_log, AuditAction, AuditLog, AuditOutcome, AuditRecord, Event, TracingAuditLog,
};
use crate::region::{RegionClient, TableSchema};
use crate::result::{
    AddReplicationGroupMemberResult, DescribeReplicationGroupResult, EventNotifier, GroupEvent,
    RemoveReplicationGroupMemberResult,
};
use crate::store::{CasOutcome, GroupStore, StoreError};

use super::errors::{CoordinatorError, CoordinatorResult};
use super::reconcile::ReconciliationSweep;
use super::registry::DriveRegistry;

/// How a change request was admitted.
enum Admission {
    /// The request's first transition was committed.
    Committed(ReplicationGroup),
    /// The same change is already in progress; nothing was written.
    InProgress(ReplicationGroup),
}

/// Entry point for replication group membership changes.
///
/// Each request commits one member transition by compare-and-swap and
/// then drives the member to a settled state, either inside the call
/// ([`ExecutionMode::Synchronous`]) or in a spawned task
/// ([`ExecutionMode::Asynchronous`]). The coordinator holds no lock on a
/// group; concurrent requests are ordered by the store's versions.
///
/// [`ExecutionMode::Synchronous`]: crate::config::ExecutionMode::Synchronous
/// [`ExecutionMode::Asynchronous`]: crate::config::ExecutionMode::Asynchronous
pub struct GroupCoordinator<S, R> {
    store: Arc<S>,
    config: Arc<CoordinatorConfig>,
    driver: MembershipDriver<S, R>,
    registry: DriveRegistry,
    notifier: EventNotifier,
    audit: Arc<dyn AuditLog>,
}

impl<S, R> Clone for GroupCoordinator<S, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            driver: self.driver.clone(),
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
            audit: Arc::clone(&self.audit),
        }
    }
}

impl<S, R> GroupCoordinator<S, R>
where
    S: GroupStore + 'static,
    R: RegionClient + 'static,
{
    /// Validate `config` and build a coordinator that audits through
    /// tracing.
    pub fn new(store: Arc<S>, client: Arc<R>, config: CoordinatorConfig) -> CoordinatorResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let notifier = EventNotifier::new(config.event_channel_capacity);
        let driver = MembershipDriver::new(
            Arc::clone(&store),
            client,
            Arc::clone(&config),
            notifier.clone(),
        );

        Ok(Self {
            store,
            config,
            driver,
            registry: DriveRegistry::new(),
            notifier,
            audit: Arc::new(TracingAuditLog),
        })
    }

    /// Validate `config` and build a coordinator with the audit log it
    /// names.
    pub fn open(store: Arc<S>, client: Arc<R>, config: CoordinatorConfig) -> CoordinatorResult<Self> {
        let audit = open_audit_log(config.audit_log_path.as_deref())?;
        Ok(Self::new(store, client, config)?.with_audit_log(audit))
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &DriveRegistry {
        &self.registry
    }

    /// Receive every committed group and member change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.notifier.subscribe()
    }

    /// A sweep that resumes stalled members of this coordinator's store.
    pub fn reconciliation_sweep(&self) -> ReconciliationSweep<S, R> {
        ReconciliationSweep::new(self.clone())
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    fn audit(&self, record: AuditRecord) {
        if let Err(e) = self.audit.append(&record) {
            error!(action = %record.action, error = %e, "failed to append audit record");
        }
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Create an empty group at version 0.
    pub async fn create_group(
        &self,
        group_id: &str,
        table_schema: TableSchema,
    ) -> CoordinatorResult<ReplicationGroup> {
        let group_id = GroupId::new(group_id)?;
        if let Some(reason) = table_schema.validate() {
            return Err(CoordinatorError::Validation(reason));
        }

        let group = ReplicationGroup::new(group_id.clone(), table_schema, Utc::now());
        match self.store.create(group.clone()).await {
            Ok(()) => {}
            Err(StoreError::GroupAlreadyExists(id)) => {
                return Err(CoordinatorError::Validation(format!(
                    "replication group {} already exists",
                    id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(event = %Event::GroupCreated, group_id = %group_id, "group created");
        self.audit(
            AuditRecord::new(AuditAction::GroupCreated, AuditOutcome::Success)
                .with_group(&group_id)
                .with_committed_version(0),
        );
        self.notifier.publish(GroupEvent::GroupCreated { group_id });
        Ok(group)
    }

    pub async fn describe_group(&self, group_id: &str) -> CoordinatorResult<ReplicationGroup> {
        let group_id = GroupId::new(group_id)?;
        Ok(self.store.load(&group_id).await?)
    }

    pub async fn list_groups(&self) -> CoordinatorResult<Vec<GroupId>> {
        Ok(self.store.list_group_ids().await?)
    }

    /// Delete a group that has no members.
    pub async fn delete_group(&self, group_id: &str) -> CoordinatorResult<()> {
        let group_id = GroupId::new(group_id)?;

        for _ in 0..self.config.max_cas_retries {
            let group = self.store.load(&group_id).await?;
            if !group.is_empty() {
                return Err(CoordinatorError::Validation(format!(
                    "replication group {} still has {} member(s)",
                    group_id,
                    group.members.len()
                )));
            }

            if let CasOutcome::Committed { version } =
                self.store.delete(&group_id, group.version).await?
            {
                info!(event = %Event::GroupDeleted, group_id = %group_id, version, "group deleted");
                self.audit(
                    AuditRecord::new(AuditAction::GroupDeleted, AuditOutcome::Success)
                        .with_group(&group_id)
                        .with_committed_version(version),
                );
                self.notifier.publish(GroupEvent::GroupDeleted { group_id });
                return Ok(());
            }
        }

        Err(CoordinatorError::conflict(
            &group_id,
            "group kept changing while being deleted",
        ))
    }

    // ------------------------------------------------------------------
    // Membership changes
    // ------------------------------------------------------------------

    /// Add `region` to the group.
    ///
    /// Returns the group with the new member ACTIVE or FAILED in
    /// synchronous mode, or in progress in asynchronous mode. Repeating an
    /// ADD that is still in progress returns the in-progress member.
    pub async fn add_member(
        &self,
        group_id: &str,
        region: &str,
        expected_version: Option<u64>,
    ) -> CoordinatorResult<ReplicationGroup> {
        let request = ChangeRequest::add(GroupId::new(group_id)?, RegionId::new(region)?)
            .with_expected_version(expected_version);
        self.submit(request).await
    }

    /// Remove an ACTIVE or FAILED `region` from the group.
    ///
    /// Returns the group without the member in synchronous mode, or with
    /// the member DELETING in asynchronous mode.
    pub async fn remove_member(
        &self,
        group_id: &str,
        region: &str,
        expected_version: Option<u64>,
    ) -> CoordinatorResult<ReplicationGroup> {
        let request = ChangeRequest::remove(GroupId::new(group_id)?, RegionId::new(region)?)
            .with_expected_version(expected_version);
        self.submit(request).await
    }

    pub async fn add_replication_group_member(
        &self,
        group_id: &str,
        region: &str,
        expected_version: Option<u64>,
    ) -> CoordinatorResult<AddReplicationGroupMemberResult> {
        self.add_member(group_id, region, expected_version)
            .await
            .map(Into::into)
    }

    pub async fn remove_replication_group_member(
        &self,
        group_id: &str,
        region: &str,
        expected_version: Option<u64>,
    ) -> CoordinatorResult<RemoveReplicationGroupMemberResult> {
        self.remove_member(group_id, region, expected_version)
            .await
            .map(Into::into)
    }

    pub async fn describe_replication_group(
        &self,
        group_id: &str,
    ) -> CoordinatorResult<DescribeReplicationGroupResult> {
        self.describe_group(group_id).await.map(Into::into)
    }

    /// Admit and carry out one change request.
    pub async fn submit(&self, request: ChangeRequest) -> CoordinatorResult<ReplicationGroup> {
        info!(
            event = %Event::ChangeRequested,
            request_id = %request.request_id,
            group_id = %request.group_id,
            region = %request.region,
            operation = %request.operation,
            expected_version = request.expected_version,
            "membership change requested"
        );
        self.audit(AuditRecord::for_request(
            &request,
            AuditAction::ChangeRequested,
            AuditOutcome::Pending,
        ));

        let admission = match self.admit(&request).await {
            Ok(admission) => admission,
            Err(e) => {
                warn!(
                    event = %Event::ChangeRejected,
                    request_id = %request.request_id,
                    error = %e,
                    "membership change rejected"
                );
                self.audit(
                    AuditRecord::for_request(
                        &request,
                        AuditAction::ChangeRejected,
                        AuditOutcome::Rejected,
                    )
                    .with_error(e.to_string()),
                );
                return Err(e);
            }
        };

        match admission {
            Admission::InProgress(group) => {
                info!(
                    request_id = %request.request_id,
                    version = group.version,
                    "same change already in progress"
                );
                Ok(group)
            }
            Admission::Committed(group) => {
                self.audit(
                    AuditRecord::for_request(
                        &request,
                        AuditAction::ChangeCommitted,
                        AuditOutcome::Pending,
                    )
                    .with_committed_version(group.version),
                );
                maybe_crash(points::COORDINATOR_AFTER_REQUEST_COMMIT);
                let region = request.region.clone();
                self.carry_out(Some(request), region, group).await
            }
        }
    }

    /// Validate the request against the latest snapshot and commit the
    /// member's first transition.
    async fn admit(&self, request: &ChangeRequest) -> CoordinatorResult<Admission> {
        let group_id = &request.group_id;
        let region = &request.region;

        for _ in 0..self.config.max_cas_retries {
            let mut group = self.store.load(group_id).await?;
            let expected_version = group.version;

            if let Some(pinned) = request.expected_version {
                if pinned != expected_version {
                    return Err(CoordinatorError::conflict(
                        group_id,
                        format!(
                            "expected version {}, group is at version {}",
                            pinned, expected_version
                        ),
                    ));
                }
            }

            let now = Utc::now();
            let from = match (request.operation, group.member_mut(region)) {
                (MemberOperation::Add, None) => {
                    group
                        .members
                        .insert(region.clone(), Member::for_add(region.clone(), now));
                    None
                }
                (MemberOperation::Add, Some(member))
                    if member.operation == MemberOperation::Add
                        && member.state.is_in_progress() =>
                {
                    return Ok(Admission::InProgress(group));
                }
                (MemberOperation::Add, Some(member)) => {
                    return Err(CoordinatorError::Validation(format!(
                        "region {} is already a member in state {}",
                        region, member.state
                    )));
                }
                (MemberOperation::Remove, None) => {
                    return Err(CoordinatorError::Validation(format!(
                        "region {} is not a member of group {}",
                        region, group_id
                    )));
                }
                (MemberOperation::Remove, Some(member))
                    if member.state == MemberState::Deleting =>
                {
                    return Ok(Admission::InProgress(group));
                }
                (MemberOperation::Remove, Some(member))
                    if matches!(member.state, MemberState::Active | MemberState::Failed) =>
                {
                    let from = member.state;
                    member.operation = MemberOperation::Remove;
                    member
                        .transition(MemberState::begin_delete, now)
                        .map_err(|e| CoordinatorError::from_membership(group_id, e))?;
                    Some(from)
                }
                (MemberOperation::Remove, Some(member)) => {
                    return Err(CoordinatorError::Validation(format!(
                        "region {} cannot be removed while {}; cancel the change instead",
                        region, member.state
                    )));
                }
            };

            if let Some(group) = self
                .commit_transition(group, expected_version, region, from)
                .await?
            {
                return Ok(Admission::Committed(group));
            }
        }

        Err(CoordinatorError::conflict(
            group_id,
            "group kept changing while the request was admitted",
        ))
    }

    /// CAS `group` and announce the member's new state. `None` on conflict.
    async fn commit_transition(
        &self,
        mut group: ReplicationGroup,
        expected_version: u64,
        region: &RegionId,
        from: Option<MemberState>,
    ) -> CoordinatorResult<Option<ReplicationGroup>> {
        let group_id = group.group_id.clone();
        group.updated_at = Utc::now();

        match self
            .store
            .compare_and_swap(&group_id, expected_version, group.clone())
            .await?
        {
            CasOutcome::Committed { version } => {
                group.version = version;
                let to = group
                    .member(region)
                    .map(|m| m.state)
                    .unwrap_or(MemberState::Removed);

                let event = if to == MemberState::Deleting {
                    Event::MemberDeleting
                } else {
                    Event::MemberCreating
                };
                info!(
                    event = %event,
                    group_id = %group_id,
                    region = %region,
                    version,
                    "member transition committed"
                );
                self.notifier.publish(GroupEvent::MemberStateChanged {
                    group_id,
                    region: region.clone(),
                    from,
                    to,
                    version,
                });
                Ok(Some(group))
            }
            CasOutcome::Conflict { current_version } => {
                info!(
                    event = %Event::CasConflict,
                    group_id = %group_id,
                    expected_version,
                    current_version,
                    "admission lost to concurrent writer, reloading"
                );
                Ok(None)
            }
        }
    }

    /// Move a FAILED member back into its operation's lifecycle and drive
    /// it again.
    pub async fn retry_member(
        &self,
        group_id: &str,
        region: &str,
    ) -> CoordinatorResult<ReplicationGroup> {
        let group_id = GroupId::new(group_id)?;
        let region = RegionId::new(region)?;

        let group = self
            .change_member(&group_id, &region, |member| {
                if member.state != MemberState::Failed {
                    return Err(CoordinatorError::Validation(format!(
                        "only FAILED members can be retried; {} is {}",
                        member.region, member.state
                    )));
                }
                let operation = member.operation;
                member
                    .transition(|s| s.retry(operation), Utc::now())
                    .map_err(CoordinatorError::Membership)
            })
            .await?;

        self.audit(
            AuditRecord::new(AuditAction::MemberRetried, AuditOutcome::Pending)
                .with_group(&group_id)
                .with_region(&region)
                .with_committed_version(group.version),
        );
        self.carry_out(None, region, group).await
    }

    /// Cancel an ADD that has not reached ACTIVE. The member moves to
    /// DELETING and its table, if any, is deleted.
    pub async fn cancel_member_change(
        &self,
        group_id: &str,
        region: &str,
    ) -> CoordinatorResult<ReplicationGroup> {
        let group_id = GroupId::new(group_id)?;
        let region = RegionId::new(region)?;

        let group = self
            .change_member(&group_id, &region, |member| {
                let cancellable = member.operation == MemberOperation::Add
                    && matches!(
                        member.state,
                        MemberState::Creating | MemberState::Bootstrapping
                    );
                if !cancellable {
                    return Err(CoordinatorError::Validation(format!(
                        "no cancellable ADD for {} (state {}, operation {})",
                        member.region, member.state, member.operation
                    )));
                }
                member.operation = MemberOperation::Remove;
                member
                    .transition(MemberState::begin_delete, Utc::now())
                    .map_err(CoordinatorError::Membership)
            })
            .await?;

        self.audit(
            AuditRecord::new(AuditAction::MemberCancelled, AuditOutcome::Pending)
                .with_group(&group_id)
                .with_region(&region)
                .with_committed_version(group.version),
        );
        self.carry_out(None, region, group).await
    }

    /// Load, apply `change` to one member, and commit, retrying on
    /// conflict.
    async fn change_member<F>(
        &self,
        group_id: &GroupId,
        region: &RegionId,
        change: F,
    ) -> CoordinatorResult<ReplicationGroup>
    where
        F: Fn(&mut Member) -> CoordinatorResult<()> + Send,
    {
        for _ in 0..self.config.max_cas_retries {
            let mut group = self.store.load(group_id).await?;
            let expected_version = group.version;
            let Some(member) = group.member_mut(region) else {
                return Err(CoordinatorError::Validation(format!(
                    "region {} is not a member of group {}",
                    region, group_id
                )));
            };
            let from = member.state;
            change(member)?;

            if let Some(group) = self
                .commit_transition(group, expected_version, region, Some(from))
                .await?
            {
                return Ok(group);
            }
        }

        Err(CoordinatorError::conflict(
            group_id,
            "group kept changing while the member was updated",
        ))
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    /// Drive the member in the current task, waiting for any other task of
    /// this process that is driving it first.
    pub async fn drive_member(
        &self,
        group_id: &GroupId,
        region: &RegionId,
    ) -> CoordinatorResult<DriveOutcome> {
        let _guard = self.registry.acquire(group_id, region).await;
        self.driver
            .drive(group_id, region)
            .await
            .map_err(|e| CoordinatorError::from_membership(group_id, e))
    }

    /// Drive the member only if no other task of this process is.
    /// `None` when the member is already being driven.
    pub(crate) async fn try_drive_member(
        &self,
        group_id: &GroupId,
        region: &RegionId,
    ) -> CoordinatorResult<Option<DriveOutcome>> {
        let Some(_guard) = self.registry.try_acquire(group_id, region) else {
            return Ok(None);
        };
        self.driver
            .drive(group_id, region)
            .await
            .map(Some)
            .map_err(|e| CoordinatorError::from_membership(group_id, e))
    }

    /// Drive the member of a just-committed change, inline or in a spawned
    /// task depending on the execution mode.
    async fn carry_out(
        &self,
        request: Option<ChangeRequest>,
        region: RegionId,
        committed: ReplicationGroup,
    ) -> CoordinatorResult<ReplicationGroup> {
        let group_id = committed.group_id.clone();

        if self.config.is_async() {
            let coordinator = self.clone();
            tokio::spawn(async move {
                let outcome = coordinator.drive_member(&group_id, &region).await;
                coordinator.record_outcome(request.as_ref(), &group_id, &region, &outcome);
            });
            return Ok(committed);
        }

        let outcome = self.drive_member(&group_id, &region).await;
        self.record_outcome(request.as_ref(), &group_id, &region, &outcome);
        outcome?;
        Ok(self.store.load(&group_id).await?)
    }

    fn record_outcome(
        &self,
        request: Option<&ChangeRequest>,
        group_id: &GroupId,
        region: &RegionId,
        outcome: &CoordinatorResult<DriveOutcome>,
    ) {
        let record = |action, result| match request {
            Some(request) => AuditRecord::for_request(request, action, result),
            None => AuditRecord::new(action, result)
                .with_group(group_id)
                .with_region(region),
        };

        match outcome {
            Ok(DriveOutcome::Settled {
                state: MemberState::Active,
                version,
            })
            | Ok(DriveOutcome::Removed { version }) => self.audit(
                record(AuditAction::ChangeCommitted, AuditOutcome::Success)
                    .with_committed_version(*version),
            ),
            Ok(DriveOutcome::Settled {
                state: MemberState::Failed,
                version,
            }) => self.audit(
                record(AuditAction::ChangeFailed, AuditOutcome::Failed)
                    .with_committed_version(*version),
            ),
            Ok(_) => {}
            Err(e) => {
                error!(
                    group_id = %group_id,
                    region = %region,
                    error = %e,
                    "membership driver stopped with an error"
                );
                self.audit(
                    record(AuditAction::ChangeFailed, AuditOutcome::Failed).with_error(e.to_string()),
                );
            }
        }
    }
}
