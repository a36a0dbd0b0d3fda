//! Membership Error Types
//!
//! Errors raised while moving a member through its lifecycle. Region
//! failures never appear here: they are absorbed by backoff or recorded
//! on the member as FAILED.

use std::fmt;

use crate::store::StoreError;

/// Membership error type
#[derive(Debug, Clone)]
pub struct MembershipError {
    /// Error kind
    pub kind: MembershipErrorKind,
    /// Error message
    pub message: String,
}

/// Membership error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipErrorKind {
    /// Forbidden lifecycle transition attempted
    ForbiddenTransition,

    /// Compare-and-swap kept losing to concurrent writers
    CasRetriesExhausted,

    /// The group state store failed
    StoreFailure,
}

impl MembershipError {
    /// Create a new membership error.
    pub fn new(kind: MembershipErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a forbidden transition error.
    pub fn forbidden_transition(from: &str, to: &str) -> Self {
        Self::new(
            MembershipErrorKind::ForbiddenTransition,
            format!("forbidden transition: {} -> {}", from, to),
        )
    }

    /// Create a CAS exhaustion error.
    pub fn cas_retries_exhausted(group_id: &str, attempts: u32) -> Self {
        Self::new(
            MembershipErrorKind::CasRetriesExhausted,
            format!(
                "gave up committing to group {} after {} conflicting attempts",
                group_id, attempts
            ),
        )
    }
}

impl fmt::Display for MembershipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MembershipError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for MembershipError {}

impl From<StoreError> for MembershipError {
    fn from(e: StoreError) -> Self {
        Self::new(MembershipErrorKind::StoreFailure, e.to_string())
    }
}

/// Result type for membership operations
pub type MembershipResult<T> = Result<T, MembershipError>;
