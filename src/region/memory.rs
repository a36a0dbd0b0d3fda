use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::group::RegionId;

use super::client::RegionClient;
use super::errors::{RegionError, RegionResult};
use super::types::{StreamPosition, TableHandle, TableSchema, TableStatus};

/// Region adapter operations, used to target injected faults and to read
/// call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionCall {
    CreateTable,
    EnableStream,
    DescribeTable,
    GetStreamPosition,
    DeleteTable,
}

#[derive(Debug, Default)]
struct Fault {
    transient_remaining: u32,
    permanent: Option<String>,
}

#[derive(Debug)]
struct SimTable {
    handle: TableHandle,
    status: TableStatus,
    stream_enabled: bool,
    position: u64,
    polls_until_active: u32,
    polls_until_gone: u32,
}

#[derive(Debug)]
struct Inner {
    tables: HashMap<(RegionId, String), SimTable>,
    faults: HashMap<(RegionId, RegionCall), Fault>,
    calls: HashMap<(RegionId, RegionCall), u64>,
    write_frontier: u64,
    catch_up_step: u64,
    activation_polls: u32,
    deletion_polls: u32,
}

/// In-process region adapter.
///
/// Keeps one table map per region and models the two long waits of the
/// membership lifecycle: tables report CREATING for a configurable number
/// of describe calls, and replica stream positions advance towards the
/// write frontier by a configurable step on each position read. Faults
/// can be scripted per region and call.
#[derive(Debug, Clone)]
pub struct InMemoryRegionClient {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRegionClient {
    /// A client whose tables are ACTIVE immediately and whose replicas
    /// catch up on the first position read.
    pub fn new() -> Self {
        let inner = Inner {
            tables: HashMap::new(),
            faults: HashMap::new(),
            calls: HashMap::new(),
            write_frontier: 0,
            catch_up_step: u64::MAX,
            activation_polls: 0,
            deletion_polls: 0,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Fail the next `times` calls of `call` in `region` with a transient error.
    pub async fn fail_transient(&self, region: &RegionId, call: RegionCall, times: u32) {
        let mut inner = self.inner.lock().await;
        inner
            .faults
            .entry((region.clone(), call))
            .or_default()
            .transient_remaining = times;
    }

    /// Fail every call of `call` in `region` with a permanent error until cleared.
    pub async fn fail_permanent(&self, region: &RegionId, call: RegionCall, message: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .faults
            .entry((region.clone(), call))
            .or_default()
            .permanent = Some(message.to_string());
    }

    /// Remove every scripted fault for `region`.
    pub async fn clear_faults(&self, region: &RegionId) {
        let mut inner = self.inner.lock().await;
        inner.faults.retain(|(r, _), _| r != region);
    }

    /// Set the position writers have reached in the replication stream.
    pub async fn set_write_frontier(&self, position: u64) {
        self.inner.lock().await.write_frontier = position;
    }

    /// How far a replica advances towards the frontier per position read.
    /// Zero means replicas never catch up.
    pub async fn set_catch_up_step(&self, step: u64) {
        self.inner.lock().await.catch_up_step = step;
    }

    /// Number of describe calls a new table reports CREATING for.
    pub async fn set_activation_polls(&self, polls: u32) {
        self.inner.lock().await.activation_polls = polls;
    }

    /// Number of describe calls a deleted table reports DELETING for.
    pub async fn set_deletion_polls(&self, polls: u32) {
        self.inner.lock().await.deletion_polls = polls;
    }

    /// Place an existing, caught-up table in `region`, as if created out of band.
    pub async fn seed_table(&self, region: &RegionId, schema: &TableSchema) -> TableHandle {
        let mut inner = self.inner.lock().await;
        let handle = table_arn(region, &schema.table_name);
        let position = inner.write_frontier;
        inner.tables.insert(
            (region.clone(), schema.table_name.clone()),
            SimTable {
                handle: handle.clone(),
                status: TableStatus::Active,
                stream_enabled: true,
                position,
                polls_until_active: 0,
                polls_until_gone: 0,
            },
        );
        handle
    }

    pub async fn call_count(&self, region: &RegionId, call: RegionCall) -> u64 {
        let inner = self.inner.lock().await;
        inner
            .calls
            .get(&(region.clone(), call))
            .copied()
            .unwrap_or(0)
    }

    /// Whether a table (in any status) exists in `region`.
    pub async fn table_exists(&self, region: &RegionId, table_name: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .tables
            .contains_key(&(region.clone(), table_name.to_string()))
    }

    pub async fn table_count(&self) -> usize {
        self.inner.lock().await.tables.len()
    }
}

impl Default for InMemoryRegionClient {
    fn default() -> Self {
        Self::new()
    }
}

fn table_arn(region: &RegionId, table_name: &str) -> TableHandle {
    TableHandle::new(format!(
        "arn:aws:dynamodb:{}:000000000000:table/{}",
        region, table_name
    ))
}

fn table_name_of(handle: &TableHandle) -> &str {
    handle
        .as_str()
        .rsplit_once("table/")
        .map(|(_, name)| name)
        .unwrap_or_else(|| handle.as_str())
}

impl Inner {
    /// Count the call and apply any scripted fault.
    fn enter(&mut self, region: &RegionId, call: RegionCall) -> RegionResult<()> {
        *self.calls.entry((region.clone(), call)).or_insert(0) += 1;

        let Some(fault) = self.faults.get_mut(&(region.clone(), call)) else {
            return Ok(());
        };
        if let Some(message) = &fault.permanent {
            return Err(RegionError::permanent(region, message.clone()));
        }
        if fault.transient_remaining > 0 {
            fault.transient_remaining -= 1;
            return Err(RegionError::transient(
                region,
                format!("{:?} throttled", call),
            ));
        }
        Ok(())
    }

    fn table_mut(&mut self, region: &RegionId, handle: &TableHandle) -> Option<&mut SimTable> {
        self.tables
            .get_mut(&(region.clone(), table_name_of(handle).to_string()))
            .filter(|t| &t.handle == handle)
    }
}

impl RegionClient for InMemoryRegionClient {
    async fn create_table(
        &self,
        region: &RegionId,
        schema: &TableSchema,
    ) -> RegionResult<TableHandle> {
        let mut inner = self.inner.lock().await;
        inner.enter(region, RegionCall::CreateTable)?;

        if let Some(reason) = schema.validate() {
            return Err(RegionError::permanent(region, reason));
        }

        let key = (region.clone(), schema.table_name.clone());
        if let Some(existing) = inner.tables.get(&key) {
            if existing.status == TableStatus::Deleting {
                return Err(RegionError::transient(
                    region,
                    format!("table {} is still being deleted", schema.table_name),
                ));
            }
            return Ok(existing.handle.clone());
        }

        let handle = table_arn(region, &schema.table_name);
        let polls_until_active = inner.activation_polls;
        inner.tables.insert(
            key,
            SimTable {
                handle: handle.clone(),
                status: if polls_until_active == 0 {
                    TableStatus::Active
                } else {
                    TableStatus::Creating
                },
                stream_enabled: false,
                position: 0,
                polls_until_active,
                polls_until_gone: 0,
            },
        );

        Ok(handle)
    }

    async fn enable_stream(&self, region: &RegionId, handle: &TableHandle) -> RegionResult<()> {
        let mut inner = self.inner.lock().await;
        inner.enter(region, RegionCall::EnableStream)?;

        match inner.table_mut(region, handle) {
            Some(table) => {
                table.stream_enabled = true;
                Ok(())
            }
            None => Err(RegionError::permanent(
                region,
                format!("table {} not found", handle),
            )),
        }
    }

    async fn describe_table(
        &self,
        region: &RegionId,
        handle: &TableHandle,
    ) -> RegionResult<TableStatus> {
        let mut inner = self.inner.lock().await;
        inner.enter(region, RegionCall::DescribeTable)?;

        let Some(table) = inner.table_mut(region, handle) else {
            return Ok(TableStatus::NotFound);
        };

        let status = table.status;
        match status {
            TableStatus::Creating => {
                table.polls_until_active = table.polls_until_active.saturating_sub(1);
                if table.polls_until_active == 0 {
                    table.status = TableStatus::Active;
                }
                Ok(TableStatus::Creating)
            }
            TableStatus::Deleting if table.polls_until_gone > 0 => {
                table.polls_until_gone -= 1;
                Ok(TableStatus::Deleting)
            }
            TableStatus::Deleting => {
                let key = (region.clone(), table_name_of(handle).to_string());
                inner.tables.remove(&key);
                Ok(TableStatus::NotFound)
            }
            status => Ok(status),
        }
    }

    async fn get_stream_position(
        &self,
        region: &RegionId,
        handle: &TableHandle,
    ) -> RegionResult<StreamPosition> {
        let mut inner = self.inner.lock().await;
        inner.enter(region, RegionCall::GetStreamPosition)?;

        let frontier = inner.write_frontier;
        let step = inner.catch_up_step;
        let Some(table) = inner.table_mut(region, handle) else {
            return Err(RegionError::permanent(
                region,
                format!("table {} not found", handle),
            ));
        };
        if !table.stream_enabled {
            return Err(RegionError::permanent(
                region,
                format!("stream not enabled on {}", handle),
            ));
        }

        if table.status == TableStatus::Active && table.position < frontier {
            table.position = table.position.saturating_add(step).min(frontier);
        }
        Ok(StreamPosition::new(table.position))
    }

    async fn delete_table(&self, region: &RegionId, handle: &TableHandle) -> RegionResult<()> {
        let mut inner = self.inner.lock().await;
        inner.enter(region, RegionCall::DeleteTable)?;

        let polls = inner.deletion_polls;
        if let Some(table) = inner.table_mut(region, handle) {
            if table.status != TableStatus::Deleting {
                table.status = TableStatus::Deleting;
                table.polls_until_gone = polls;
            }
        }
        Ok(())
    }
}
