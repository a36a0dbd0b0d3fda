//! Member Lifecycle State Machine
//!
//! Each member of a replication group moves through:
//!
//! ```text
//! CREATING ──► BOOTSTRAPPING ──► ACTIVE ──► DELETING ──► REMOVED
//!    │              │                          │
//!    └──────────────┴───────► FAILED ◄─────────┘
//! ```
//!
//! - Transitions are explicit methods; anything else is forbidden
//! - CREATING / BOOTSTRAPPING may move to DELETING (cancellation)
//! - FAILED is terminal except for an explicit retry, which re-enters
//!   CREATING or DELETING depending on the member's operation
//! - REMOVED is never persisted: the member entry is dropped in the same
//!   commit that reaches it

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{MembershipError, MembershipResult};

/// The operation currently owning a member.
///
/// Decides where a retry of a FAILED member re-enters the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberOperation {
    Add,
    Remove,
}

impl MemberOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for MemberOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberState {
    /// Regional table is being created.
    Creating,

    /// Table exists; the replica is catching up to the write frontier.
    Bootstrapping,

    /// Replica is caught up and serving.
    Active,

    /// Regional table is being deleted.
    Deleting,

    /// Table is gone; the member is dropped from the group.
    Removed,

    /// A region rejected the operation or it timed out.
    /// Requires an explicit retry or removal.
    Failed,
}

impl MemberState {
    /// Get the state name for observability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Bootstrapping => "BOOTSTRAPPING",
            Self::Active => "ACTIVE",
            Self::Deleting => "DELETING",
            Self::Removed => "REMOVED",
            Self::Failed => "FAILED",
        }
    }

    /// States the membership driver still has work to do in.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Creating | Self::Bootstrapping | Self::Deleting)
    }

    /// States no driver will move out of on its own.
    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    /// CREATING → BOOTSTRAPPING
    ///
    /// The regional table exists and its stream is enabled.
    pub fn begin_bootstrap(self) -> MembershipResult<Self> {
        match self {
            Self::Creating => Ok(Self::Bootstrapping),
            _ => Err(MembershipError::forbidden_transition(
                self.as_str(),
                "BOOTSTRAPPING",
            )),
        }
    }

    /// BOOTSTRAPPING → ACTIVE
    ///
    /// The replica reached the write frontier.
    pub fn activate(self) -> MembershipResult<Self> {
        match self {
            Self::Bootstrapping => Ok(Self::Active),
            _ => Err(MembershipError::forbidden_transition(self.as_str(), "ACTIVE")),
        }
    }

    /// CREATING / BOOTSTRAPPING / DELETING → FAILED
    pub fn fail(self) -> MembershipResult<Self> {
        match self {
            Self::Creating | Self::Bootstrapping | Self::Deleting => Ok(Self::Failed),
            _ => Err(MembershipError::forbidden_transition(self.as_str(), "FAILED")),
        }
    }

    /// ACTIVE / FAILED → DELETING on removal,
    /// CREATING / BOOTSTRAPPING → DELETING on cancellation.
    pub fn begin_delete(self) -> MembershipResult<Self> {
        match self {
            Self::Active | Self::Failed | Self::Creating | Self::Bootstrapping => {
                Ok(Self::Deleting)
            }
            _ => Err(MembershipError::forbidden_transition(
                self.as_str(),
                "DELETING",
            )),
        }
    }

    /// DELETING → REMOVED
    pub fn complete_delete(self) -> MembershipResult<Self> {
        match self {
            Self::Deleting => Ok(Self::Removed),
            _ => Err(MembershipError::forbidden_transition(self.as_str(), "REMOVED")),
        }
    }

    /// FAILED → CREATING (ADD) or DELETING (REMOVE)
    pub fn retry(self, operation: MemberOperation) -> MembershipResult<Self> {
        match (self, operation) {
            (Self::Failed, MemberOperation::Add) => Ok(Self::Creating),
            (Self::Failed, MemberOperation::Remove) => Ok(Self::Deleting),
            (_, MemberOperation::Add) => Err(MembershipError::forbidden_transition(
                self.as_str(),
                "CREATING",
            )),
            (_, MemberOperation::Remove) => Err(MembershipError::forbidden_transition(
                self.as_str(),
                "DELETING",
            )),
        }
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
