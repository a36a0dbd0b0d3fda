//! Group State Store
//!
//! Durable, versioned record of every replication group. Writes after
//! creation are compare-and-swap on the group version; a conflict means a
//! concurrent writer won and the caller must reload.
//!
//! Two implementations:
//! - [`MemoryGroupStore`]: process-local, for tests and embedding
//! - [`FileGroupStore`]: one CRC32-framed record file per group

mod base;
mod checksum;
mod errors;
mod file;
mod memory;

pub use base::{CasOutcome, GroupStore};
pub use checksum::{compute_checksum, decode_record, encode_record, verify_checksum};
pub use errors::{StoreError, StoreResult};
pub use file::{FileGroupStore, DEFAULT_STATE_DIR};
pub use memory::MemoryGroupStore;
