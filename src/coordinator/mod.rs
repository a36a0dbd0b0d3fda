//! Group Coordinator
//!
//! Public entry point for replication group membership:
//! - validates change requests against the latest group snapshot
//! - commits the first transition of each request by compare-and-swap
//! - drives the member to a settled state inline or in a spawned task
//! - resumes interrupted transitions through a periodic sweep
//!
//! # Invariants
//!
//! - Every committed write increments the group version by exactly one
//! - A request is rejected before any region call if it fails validation
//! - At most one task per process drives a given member at a time

mod coordinator;
mod errors;
mod reconcile;
mod registry;

pub use coordinator::GroupCoordinator;
pub use errors::{CoordinatorError, CoordinatorResult};
pub use reconcile::{ReconciliationSweep, StalledMember, SweepReport};
pub use registry::{DriveGuard, DriveRegistry};
