use std::future::Future;

use crate::group::RegionId;

use super::errors::RegionResult;
use super::types::{StreamPosition, TableHandle, TableSchema, TableStatus};

/// Capability interface to the regional table and stream endpoints.
///
/// Implementations own no group state. Every call must be idempotent or
/// safely retryable, because the membership driver re-issues calls after
/// transient failures and after a process restart:
/// - creating a table that already exists returns the existing handle
/// - deleting a table that no longer exists succeeds
pub trait RegionClient: Send + Sync {
    /// Creates the regional replica table, or returns the handle of the
    /// table that already exists under the schema's table name.
    fn create_table(
        &self,
        region: &RegionId,
        schema: &TableSchema,
    ) -> impl Future<Output = RegionResult<TableHandle>> + Send;

    /// Enables the change stream used for cross-region replication.
    fn enable_stream(
        &self,
        region: &RegionId,
        handle: &TableHandle,
    ) -> impl Future<Output = RegionResult<()>> + Send;

    /// Returns the current status of a regional table.
    ///
    /// A table that does not exist is reported as [`TableStatus::NotFound`],
    /// not as an error.
    fn describe_table(
        &self,
        region: &RegionId,
        handle: &TableHandle,
    ) -> impl Future<Output = RegionResult<TableStatus>> + Send;

    /// Returns the last position the regional replica has applied.
    fn get_stream_position(
        &self,
        region: &RegionId,
        handle: &TableHandle,
    ) -> impl Future<Output = RegionResult<StreamPosition>> + Send;

    /// Starts deleting a regional table.
    fn delete_table(
        &self,
        region: &RegionId,
        handle: &TableHandle,
    ) -> impl Future<Output = RegionResult<()>> + Send;
}
