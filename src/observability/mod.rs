//! Observability for the membership coordinator
//!
//! - Structured logging through `tracing`, with typed [`Event`] names
//! - Append-only audit log of change requests and their outcomes
//! - Subscriber setup for binaries and tests
//!
//! # Usage
//!
//! ```ignore
//! use replgroup::observability::{init_tracing, Event, LogFormat};
//!
//! init_tracing(LogFormat::Json)?;
//! tracing::info!(event = %Event::GroupCreated, group_id = "orders", "group created");
//! ```

pub mod audit;
mod events;
mod telemetry;

pub use audit::{
    open_audit_log, AuditAction, AuditLog, AuditOutcome, AuditRecord, FileAuditLog,
    MemoryAuditLog, TracingAuditLog,
};
pub use events::Event;
pub use telemetry::{init_test_tracing, init_tracing, LogFormat, TracingError};
