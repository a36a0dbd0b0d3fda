use thiserror::Error;

use crate::config::ConfigError;
use crate::group::{GroupId, InvalidIdentifier, RegionId};
use crate::membership::{MembershipError, MembershipErrorKind};
use crate::region::RegionError;
use crate::store::StoreError;

/// Errors surfaced by the group coordinator.
///
/// Permanent region failures of a membership change are not errors here:
/// they are reported through the FAILED member in the returned snapshot.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Bad request or failed precondition. Not retryable as-is.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Stale expected version, or commits kept losing to concurrent
    /// writers. Reload and retry.
    #[error("conflict on group {group_id}: {reason}")]
    Conflict { group_id: String, reason: String },

    #[error("transient region error: {0}")]
    TransientRegion(RegionError),

    #[error("permanent region error: {0}")]
    PermanentRegion(RegionError),

    #[error("reconciliation of {region} in group {group_id} stalled after {attempts} sweeps")]
    ReconciliationStalled {
        group_id: GroupId,
        region: RegionId,
        attempts: u32,
    },

    #[error("group store error: {0}")]
    Store(#[from] StoreError),

    #[error("membership error: {0}")]
    Membership(MembershipError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open audit log: {0}")]
    Audit(#[from] std::io::Error),
}

impl CoordinatorError {
    pub fn conflict(group_id: &GroupId, reason: impl Into<String>) -> Self {
        Self::Conflict {
            group_id: group_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Map a driver error, turning CAS exhaustion into a conflict.
    pub fn from_membership(group_id: &GroupId, err: MembershipError) -> Self {
        match err.kind {
            MembershipErrorKind::CasRetriesExhausted => Self::conflict(group_id, err.message),
            _ => Self::Membership(err),
        }
    }

    /// Whether the caller may retry the same request after reloading.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::TransientRegion(_))
    }
}

impl From<RegionError> for CoordinatorError {
    fn from(err: RegionError) -> Self {
        if err.is_transient() {
            Self::TransientRegion(err)
        } else {
            Self::PermanentRegion(err)
        }
    }
}

impl From<InvalidIdentifier> for CoordinatorError {
    fn from(err: InvalidIdentifier) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
