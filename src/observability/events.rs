//! Observable coordinator events
//!
//! Every log line the coordinator emits about group or member lifecycle
//! carries one of these as its `event` field, so log consumers can match
//! on a closed set of names.

use std::fmt;

/// Observable events in the membership coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Group lifecycle
    /// Group created at version 0
    GroupCreated,
    /// Group deleted
    GroupDeleted,

    // Requests
    /// ADD/REMOVE/retry/cancel received
    ChangeRequested,
    /// Request rejected before any commit
    ChangeRejected,

    // Member lifecycle
    /// Member entered CREATING
    MemberCreating,
    /// Member entered BOOTSTRAPPING
    MemberBootstrapping,
    /// Member entered ACTIVE
    MemberActivated,
    /// Member entered DELETING
    MemberDeleting,
    /// Member dropped from the group
    MemberRemoved,
    /// Member entered FAILED
    MemberFailed,
    /// Driver stopped early; the sweep will resume the member
    MemberDeferred,
    /// Driver found nothing left to do for the member
    MemberHalted,
    /// A table created for a vanished member was deleted
    OrphanTableDeleted,

    // Store
    /// Compare-and-swap lost to a concurrent writer
    CasConflict,

    // Reconciliation
    /// Sweep started
    SweepStart,
    /// Sweep finished
    SweepComplete,
    /// A member made no progress across repeated sweeps
    ReconciliationStalled,

    // Process
    /// Shutdown signal observed
    ShutdownStart,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::GroupCreated => "group.created",
            Event::GroupDeleted => "group.deleted",

            Event::ChangeRequested => "change.requested",
            Event::ChangeRejected => "change.rejected",

            Event::MemberCreating => "member.creating",
            Event::MemberBootstrapping => "member.bootstrapping",
            Event::MemberActivated => "member.activated",
            Event::MemberDeleting => "member.deleting",
            Event::MemberRemoved => "member.removed",
            Event::MemberFailed => "member.failed",
            Event::MemberDeferred => "member.deferred",
            Event::MemberHalted => "member.halted",
            Event::OrphanTableDeleted => "member.orphan_table_deleted",

            Event::CasConflict => "store.cas_conflict",

            Event::SweepStart => "sweep.start",
            Event::SweepComplete => "sweep.complete",
            Event::ReconciliationStalled => "sweep.stalled",

            Event::ShutdownStart => "shutdown.start",
        }
    }

    /// Events that should be logged at error level.
    pub fn is_error(&self) -> bool {
        matches!(self, Event::MemberFailed | Event::ReconciliationStalled)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
