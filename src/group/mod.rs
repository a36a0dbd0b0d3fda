//! Replication group data model
//!
//! - [`ReplicationGroup`]: versioned snapshot of one group
//! - [`Member`]: one region's participation record
//! - [`ChangeRequest`]: an ephemeral ADD/REMOVE request
//! - [`GroupId`] / [`RegionId`]: validated identifiers

mod group;
mod ids;
mod member;
mod request;

pub use group::ReplicationGroup;
pub use ids::{GroupId, InvalidIdentifier, RegionId, MAX_GROUP_ID_LEN};
pub use member::Member;
pub use request::ChangeRequest;
