//! Membership change audit log
//!
//! - Every change request is logged when it arrives
//! - Every outcome (commit, rejection, failure) is logged
//! - The file log is append-only; each record is synced before `append`
//!   returns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

use crate::group::{ChangeRequest, GroupId, RegionId};
use crate::membership::MemberOperation;

/// Audit action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// A membership change was requested.
    ChangeRequested,

    /// The change's initial transition was committed.
    ChangeCommitted,

    /// The request failed validation or lost on version.
    ChangeRejected,

    /// The member settled in FAILED.
    ChangeFailed,

    /// A FAILED member was retried.
    MemberRetried,

    /// An in-progress ADD was cancelled.
    MemberCancelled,

    /// A group was created.
    GroupCreated,

    /// A group was deleted.
    GroupDeleted,
}

impl AuditAction {
    /// Returns the action name string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ChangeRequested => "CHANGE_REQUESTED",
            AuditAction::ChangeCommitted => "CHANGE_COMMITTED",
            AuditAction::ChangeRejected => "CHANGE_REJECTED",
            AuditAction::ChangeFailed => "CHANGE_FAILED",
            AuditAction::MemberRetried => "MEMBER_RETRIED",
            AuditAction::MemberCancelled => "MEMBER_CANCELLED",
            AuditAction::GroupCreated => "GROUP_CREATED",
            AuditAction::GroupDeleted => "GROUP_DELETED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
    /// Accepted, still in progress.
    Pending,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Rejected => "REJECTED",
            AuditOutcome::Failed => "FAILED",
            AuditOutcome::Pending => "PENDING",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record, written as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,

    /// Correlates records of one request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<MemberOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            outcome,
            request_id: None,
            group_id: None,
            region: None,
            operation: None,
            expected_version: None,
            committed_version: None,
            error_message: None,
        }
    }

    /// A record about a change request, carrying its identifiers.
    pub fn for_request(request: &ChangeRequest, action: AuditAction, outcome: AuditOutcome) -> Self {
        let mut record = Self::new(action, outcome)
            .with_group(&request.group_id)
            .with_region(&request.region);
        record.request_id = Some(request.request_id);
        record.operation = Some(request.operation);
        record.expected_version = request.expected_version;
        record
    }

    pub fn with_group(mut self, group_id: &GroupId) -> Self {
        self.group_id = Some(group_id.to_string());
        self
    }

    pub fn with_region(mut self, region: &RegionId) -> Self {
        self.region = Some(region.to_string());
        self
    }

    pub fn with_committed_version(mut self, version: u64) -> Self {
        self.committed_version = Some(version);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Serialize to a JSON line.
    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(io::Error::other)
    }
}

/// Append-only audit sink.
pub trait AuditLog: Send + Sync {
    /// Append a record; it must be durable once this returns.
    fn append(&self, record: &AuditRecord) -> io::Result<()>;

    fn sync(&self) -> io::Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> io::Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| io::Error::other("audit log lock poisoned"))
}

/// JSON-lines audit log file, fsynced after every record.
pub struct FileAuditLog {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl FileAuditLog {
    /// Open or create an audit log file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let json = record.to_json()?;
        let mut writer = lock(&self.writer)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    fn sync(&self) -> io::Result<()> {
        lock(&self.writer)?.get_ref().sync_all()
    }
}

/// In-memory audit log for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records appended so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        lock(&self.records)?.push(record.clone());
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Audit log that emits each record as a tracing event under the
/// `replgroup::audit` target. Used when no audit file is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        info!(
            target: "replgroup::audit",
            action = %record.action,
            outcome = %record.outcome,
            request_id = ?record.request_id,
            group_id = record.group_id.as_deref(),
            region = record.region.as_deref(),
            committed_version = record.committed_version,
            error = record.error_message.as_deref(),
            "audit"
        );
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

/// The audit log a coordinator with `audit_log_path` should use.
pub fn open_audit_log(path: Option<&Path>) -> io::Result<Arc<dyn AuditLog>> {
    match path {
        Some(path) => Ok(Arc::new(FileAuditLog::open(path)?)),
        None => Ok(Arc::new(TracingAuditLog)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn request() -> ChangeRequest {
        ChangeRequest::add(
            GroupId::new("orders").unwrap(),
            RegionId::new("eu-west-1").unwrap(),
        )
        .with_expected_version(Some(4))
    }

    #[test]
    fn test_record_for_request() {
        let req = request();
        let record =
            AuditRecord::for_request(&req, AuditAction::ChangeRequested, AuditOutcome::Pending);

        assert_eq!(record.request_id, Some(req.request_id));
        assert_eq!(record.group_id.as_deref(), Some("orders"));
        assert_eq!(record.region.as_deref(), Some("eu-west-1"));
        assert_eq!(record.operation, Some(MemberOperation::Add));
        assert_eq!(record.expected_version, Some(4));
    }

    #[test]
    fn test_record_json() {
        let record = AuditRecord::new(AuditAction::ChangeCommitted, AuditOutcome::Success)
            .with_committed_version(7)
            .with_error("quote \" and\nnewline");

        let json = record.to_json().unwrap();
        assert!(json.contains("\"CHANGE_COMMITTED\""));
        assert!(json.contains("\"SUCCESS\""));
        assert!(!json.contains("\"region\""));

        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_memory_audit_log() {
        let log = MemoryAuditLog::new();
        log.append(&AuditRecord::new(AuditAction::ChangeRequested, AuditOutcome::Pending))
            .unwrap();
        log.append(&AuditRecord::new(AuditAction::ChangeCommitted, AuditOutcome::Success))
            .unwrap();

        assert_eq!(log.len(), 2);
        let records = log.records();
        assert_eq!(records[0].action, AuditAction::ChangeRequested);
        assert_eq!(records[1].action, AuditAction::ChangeCommitted);
    }

    #[test]
    fn test_file_audit_log_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit").join("replgroup.log");

        {
            let log = FileAuditLog::open(&path).unwrap();
            log.append(&AuditRecord::new(AuditAction::GroupCreated, AuditOutcome::Success))
                .unwrap();
        }
        let log = FileAuditLog::open(&path).unwrap();
        log.append(&AuditRecord::new(AuditAction::GroupDeleted, AuditOutcome::Success))
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("GROUP_CREATED"));
        assert!(lines[1].contains("GROUP_DELETED"));
    }

    #[test]
    fn test_open_audit_log_without_path() {
        let log = open_audit_log(None).unwrap();
        log.append(&AuditRecord::new(AuditAction::GroupCreated, AuditOutcome::Success))
            .unwrap();
    }
}
