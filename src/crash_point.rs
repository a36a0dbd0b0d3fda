//! Crash point injection for testing crash tolerance
//!
//! Crash points are enabled via the `REPLGROUP_CRASH_POINT` environment
//! variable. When the named point is reached the process terminates via
//! `std::process::abort()`: no cleanup, no unwinding, no catching.
//!
//! A crash between a region call and the commit that records it leaves
//! the group in a state the reconciliation sweep must repair.
//!
//! ```bash
//! REPLGROUP_CRASH_POINT=driver_after_create_table cargo test --test reconciliation_crash
//! ```

use std::sync::OnceLock;

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var("REPLGROUP_CRASH_POINT").ok())
        .as_deref()
}

/// Returns true if `REPLGROUP_CRASH_POINT` equals the given name.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Coordinator
    pub const COORDINATOR_AFTER_REQUEST_COMMIT: &str = "coordinator_after_request_commit";

    // Add path
    pub const DRIVER_AFTER_CREATE_TABLE: &str = "driver_after_create_table";
    pub const DRIVER_AFTER_BOOTSTRAP_COMMIT: &str = "driver_after_bootstrap_commit";
    pub const DRIVER_BEFORE_ACTIVATE_COMMIT: &str = "driver_before_activate_commit";

    // Remove path
    pub const DRIVER_AFTER_DELETE_TABLE: &str = "driver_after_delete_table";
    pub const DRIVER_BEFORE_REMOVE_COMMIT: &str = "driver_before_remove_commit";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            COORDINATOR_AFTER_REQUEST_COMMIT,
            DRIVER_AFTER_CREATE_TABLE,
            DRIVER_AFTER_BOOTSTRAP_COMMIT,
            DRIVER_BEFORE_ACTIVATE_COMMIT,
            DRIVER_AFTER_DELETE_TABLE,
            DRIVER_BEFORE_REMOVE_COMMIT,
        ]
    }
}
