//! Membership State Machine
//!
//! Moves one member of a replication group through its lifecycle:
//! - [`MemberState`] holds the pure, explicit transitions
//! - [`MembershipDriver`] performs the region calls each transition needs
//!   and commits every transition as one compare-and-swap on the store
//! - [`Backoff`] paces transient retries and long polls
//!
//! Transient region errors never leave this module; permanent ones end up
//! on the member as FAILED with `last_error` set.

mod backoff;
mod driver;
mod errors;
mod state;

pub use backoff::{retry_transient, Backoff};
pub use driver::{DriveOutcome, MembershipDriver};
pub use errors::{MembershipError, MembershipErrorKind, MembershipResult};
pub use state::{MemberOperation, MemberState};
