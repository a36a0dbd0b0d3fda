//! Region Client Adapter
//!
//! Thin capability boundary to the per-region table and stream endpoints:
//! - create / describe / delete a regional replica table
//! - enable the change stream and read a replica's stream position
//!
//! The adapter owns no group state. The coordinator consumes it as a
//! capability; wrapping a real cloud provider API is left to implementors
//! of [`RegionClient`].

mod client;
mod errors;
mod memory;
mod types;

pub use client::RegionClient;
pub use errors::{RegionError, RegionResult};
pub use memory::{InMemoryRegionClient, RegionCall};
pub use types::{
    AttributeDefinition, AttributeType, StreamPosition, TableHandle, TableSchema, TableStatus,
};
