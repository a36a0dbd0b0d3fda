use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::group::{GroupId, RegionId};
use crate::membership::{DriveOutcome, MemberState};
use crate::observability::Event;
use crate::region::RegionClient;
use crate::shutdown::ShutdownRx;
use crate::store::GroupStore;

use super::coordinator::GroupCoordinator;
use super::errors::{CoordinatorError, CoordinatorResult};

type MemberKey = (GroupId, RegionId);

/// A member the sweep keeps resuming without any change in its state or
/// deferral reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledMember {
    pub group_id: GroupId,
    pub region: RegionId,
    pub state: MemberState,
    /// Consecutive sweeps without progress.
    pub sweeps: u32,
    pub reason: String,
}

impl StalledMember {
    pub fn to_error(&self) -> CoordinatorError {
        CoordinatorError::ReconciliationStalled {
            group_id: self.group_id.clone(),
            region: self.region.clone(),
            attempts: self.sweeps,
        }
    }
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub groups_scanned: usize,
    /// Members the sweep drove.
    pub members_resumed: usize,
    /// Driven members that reached ACTIVE or FAILED.
    pub settled: usize,
    pub removed: usize,
    pub deferred: usize,
    /// Stale members left alone because another task was driving them.
    pub skipped_busy: usize,
    pub stalled: Vec<StalledMember>,
    /// Groups whose scan or drive failed, with the error.
    pub failed_groups: Vec<(GroupId, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.stalled.is_empty() && self.failed_groups.is_empty()
    }
}

/// What one sweep saw for one member.
enum Resumed {
    Busy,
    Driven(DriveOutcome),
    Errored(String),
}

struct MemberPass {
    region: RegionId,
    state: MemberState,
    resumed: Resumed,
}

#[derive(Debug, Clone)]
struct Progress {
    fingerprint: (MemberState, String),
    stalled: u32,
}

/// Periodic pass that resumes members whose transition was interrupted.
///
/// A member is picked up when it has been in a non-terminal state for at
/// least the configured staleness threshold, which covers both crashed
/// drivers and deferred outcomes. Members driven by a task of this process
/// are skipped.
pub struct ReconciliationSweep<S, R> {
    coordinator: GroupCoordinator<S, R>,
    progress: Arc<Mutex<HashMap<MemberKey, Progress>>>,
}

impl<S, R> Clone for ReconciliationSweep<S, R> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            progress: Arc::clone(&self.progress),
        }
    }
}

impl<S, R> ReconciliationSweep<S, R>
where
    S: GroupStore + 'static,
    R: RegionClient + 'static,
{
    pub fn new(coordinator: GroupCoordinator<S, R>) -> Self {
        Self {
            coordinator,
            progress: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn progress(&self) -> MutexGuard<'_, HashMap<MemberKey, Progress>> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Scan every group once and resume its stale members.
    #[instrument(skip_all)]
    pub async fn sweep_once(&self) -> CoordinatorResult<SweepReport> {
        info!(event = %Event::SweepStart, "reconciliation sweep started");

        let group_ids = self.coordinator.store().list_group_ids().await?;
        let mut report = SweepReport {
            groups_scanned: group_ids.len(),
            ..SweepReport::default()
        };

        let passes = group_ids.into_iter().map(|group_id| async move {
            let pass = self.sweep_group(&group_id).await;
            (group_id, pass)
        });

        let mut seen = Vec::new();
        for (group_id, pass) in join_all(passes).await {
            match pass {
                Ok(members) => {
                    for member in members {
                        seen.push((group_id.clone(), member.region.clone()));
                        self.record(&group_id, member, &mut report);
                    }
                }
                Err(e) => {
                    warn!(group_id = %group_id, error = %e, "group could not be swept");
                    report.failed_groups.push((group_id, e.to_string()));
                }
            }
        }

        // Members that were not stale this time have moved on.
        self.progress()
            .retain(|key, _| seen.iter().any(|seen| seen == key));

        info!(
            event = %Event::SweepComplete,
            groups = report.groups_scanned,
            resumed = report.members_resumed,
            settled = report.settled,
            removed = report.removed,
            deferred = report.deferred,
            skipped_busy = report.skipped_busy,
            stalled = report.stalled.len(),
            failed_groups = report.failed_groups.len(),
            "reconciliation sweep complete"
        );
        Ok(report)
    }

    /// Drive the stale members of one group, one after another.
    async fn sweep_group(&self, group_id: &GroupId) -> CoordinatorResult<Vec<MemberPass>> {
        let threshold = self.coordinator.config().reconciliation.staleness_threshold();
        let group = match self.coordinator.store().load(group_id).await {
            Ok(group) => group,
            // Deleted between listing and loading.
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let stale: Vec<_> = group
            .in_progress_members()
            .filter(|m| {
                m.time_in_state(now).to_std().unwrap_or(Duration::ZERO) >= threshold
            })
            .map(|m| (m.region.clone(), m.state))
            .collect();

        let mut passes = Vec::with_capacity(stale.len());
        for (region, state) in stale {
            debug!(group_id = %group_id, region = %region, state = %state, "resuming member");
            let resumed = match self.coordinator.try_drive_member(group_id, &region).await {
                Ok(Some(outcome)) => Resumed::Driven(outcome),
                Ok(None) => Resumed::Busy,
                Err(e) => Resumed::Errored(e.to_string()),
            };
            passes.push(MemberPass {
                region,
                state,
                resumed,
            });
        }
        Ok(passes)
    }

    fn record(&self, group_id: &GroupId, pass: MemberPass, report: &mut SweepReport) {
        let key = (group_id.clone(), pass.region);
        let fingerprint = match pass.resumed {
            Resumed::Busy => {
                report.skipped_busy += 1;
                return;
            }
            Resumed::Driven(DriveOutcome::Deferred { state, reason }) => {
                report.members_resumed += 1;
                report.deferred += 1;
                (state, reason)
            }
            Resumed::Driven(outcome) => {
                report.members_resumed += 1;
                match outcome {
                    DriveOutcome::Settled { .. } => report.settled += 1,
                    DriveOutcome::Removed { .. } => report.removed += 1,
                    DriveOutcome::Halted | DriveOutcome::Deferred { .. } => {}
                }
                self.progress().remove(&key);
                return;
            }
            Resumed::Errored(message) => {
                report.members_resumed += 1;
                report
                    .failed_groups
                    .push((group_id.clone(), format!("{}: {}", key.1, message)));
                (pass.state, message)
            }
        };

        let max_stalled = self.coordinator.config().reconciliation.max_stalled_sweeps;
        let mut progress = self.progress();
        let entry = progress.entry(key.clone()).or_insert(Progress {
            fingerprint: fingerprint.clone(),
            stalled: 0,
        });
        if entry.fingerprint == fingerprint {
            entry.stalled += 1;
        } else {
            entry.fingerprint = fingerprint;
            entry.stalled = 1;
        }

        if entry.stalled >= max_stalled {
            let (state, reason) = entry.fingerprint.clone();
            error!(
                event = %Event::ReconciliationStalled,
                group_id = %key.0,
                region = %key.1,
                state = %state,
                sweeps = entry.stalled,
                reason = %reason,
                "member made no progress across sweeps"
            );
            report.stalled.push(StalledMember {
                group_id: key.0,
                region: key.1,
                state,
                sweeps: entry.stalled,
                reason,
            });
        }
    }

    /// Sweep every `sweep_interval` until `shutdown` fires.
    pub async fn run(self, mut shutdown: ShutdownRx) {
        let period = self.coordinator.config().reconciliation.sweep_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!(event = %Event::ShutdownStart, "reconciliation loop stopping");
                    return;
                }

                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "reconciliation sweep failed");
                    }
                }
            }
        }
    }
}
