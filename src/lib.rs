//! replgroup - Membership coordinator for multi-region replication groups
//!
//! A replication group is one logical table replicated across regions. This
//! crate adds and removes regional members of a group, driving each member
//! through its lifecycle (CREATING, BOOTSTRAPPING, ACTIVE, DELETING) while
//! regional operations fail, time out, or are cut short by a crash.
//!
//! # Layout
//!
//! - `group`: the group snapshot, its members, and change requests
//! - `membership`: member state machine and the driver that advances it
//! - `store`: versioned compare-and-swap persistence of groups
//! - `region`: capability interface to the regional table endpoints
//! - `coordinator`: request admission, execution, and reconciliation
//! - `observability`: tracing events and the audit log

pub mod config;
pub mod coordinator;
pub mod crash_point;
pub mod group;
pub mod membership;
pub mod observability;
pub mod region;
pub mod result;
pub mod shutdown;
pub mod store;

pub use config::{CoordinatorConfig, ExecutionMode};
pub use coordinator::{CoordinatorError, CoordinatorResult, GroupCoordinator};
pub use group::{GroupId, Member, RegionId, ReplicationGroup};
pub use membership::{MemberOperation, MemberState};
