use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::group::{GroupId, ReplicationGroup};

use super::base::{CasOutcome, GroupStore};
use super::checksum::{decode_record, encode_record};
use super::errors::{StoreError, StoreResult};

const RECORD_EXTENSION: &str = "group";

/// State directory used when the configuration names none.
pub const DEFAULT_STATE_DIR: &str = "replgroup-state";

/// Write locks shared by every store open on the same directory in this
/// process, keyed by canonical path.
static DIR_LOCKS: OnceLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

fn dir_lock(canonical: PathBuf) -> Arc<Mutex<()>> {
    let locks = DIR_LOCKS.get_or_init(Default::default);
    let mut locks = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(canonical).or_default())
}

/// Group store keeping one checksummed record file per group.
///
/// Records are replaced atomically: the new record is written to a
/// temporary file, fsynced, and renamed over the old one. Every read
/// verifies the record checksum. Writers are serialized across every
/// store open on the same directory in this process; the store assumes
/// no other process writes the directory at the same time.
#[derive(Debug, Clone)]
pub struct FileGroupStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileGroupStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        let canonical = fs::canonicalize(&dir).await?;
        Ok(Self {
            dir,
            write_lock: dir_lock(canonical),
        })
    }

    /// Open the store under the configured `state_dir`.
    pub async fn open_configured(config: &CoordinatorConfig) -> StoreResult<Self> {
        match &config.state_dir {
            Some(dir) => Self::open(dir).await,
            None => Self::open(DEFAULT_STATE_DIR).await,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for a group.
    pub fn record_path(&self, group_id: &GroupId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", group_id.as_str(), RECORD_EXTENSION))
    }

    fn temp_path(&self, group_id: &GroupId) -> PathBuf {
        self.dir.join(format!(
            ".{}.{}.{}.tmp",
            group_id.as_str(),
            RECORD_EXTENSION,
            Uuid::new_v4().simple()
        ))
    }

    /// Read a record, or `None` if the group has no record file.
    async fn read_record(&self, group_id: &GroupId) -> StoreResult<Option<ReplicationGroup>> {
        let bytes = match fs::read(self.record_path(group_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let payload =
            decode_record(&bytes).map_err(|reason| StoreError::corrupted(group_id.as_str(), reason))?;
        let group: ReplicationGroup = serde_json::from_slice(payload)
            .map_err(|e| StoreError::corrupted(group_id.as_str(), e.to_string()))?;

        if &group.group_id != group_id {
            return Err(StoreError::GroupIdMismatch {
                expected: group_id.clone(),
                found: group.group_id,
            });
        }
        Ok(Some(group))
    }

    async fn write_record(&self, group: &ReplicationGroup) -> StoreResult<()> {
        let payload = serde_json::to_vec(group)?;
        let framed = encode_record(&payload);

        let temp = self.temp_path(&group.group_id);
        if let Err(e) = self.replace_with(&temp, &framed, &group.group_id).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }

        debug!(
            group_id = %group.group_id,
            version = group.version,
            bytes = framed.len(),
            "group record written"
        );
        Ok(())
    }

    async fn replace_with(&self, temp: &Path, framed: &[u8], group_id: &GroupId) -> StoreResult<()> {
        let mut file = fs::File::create(temp).await?;
        file.write_all(framed).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(temp, self.record_path(group_id)).await?;
        self.sync_dir().await
    }

    async fn sync_dir(&self) -> StoreResult<()> {
        fs::File::open(&self.dir).await?.sync_all().await?;
        Ok(())
    }
}

impl GroupStore for FileGroupStore {
    async fn create(&self, mut group: ReplicationGroup) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(self.record_path(&group.group_id)).await? {
            return Err(StoreError::GroupAlreadyExists(group.group_id));
        }
        group.version = 0;
        self.write_record(&group).await
    }

    async fn load(&self, group_id: &GroupId) -> StoreResult<ReplicationGroup> {
        self.read_record(group_id)
            .await?
            .ok_or_else(|| StoreError::GroupNotFound(group_id.clone()))
    }

    async fn compare_and_swap(
        &self,
        group_id: &GroupId,
        expected_version: u64,
        mut group: ReplicationGroup,
    ) -> StoreResult<CasOutcome> {
        if &group.group_id != group_id {
            return Err(StoreError::GroupIdMismatch {
                expected: group_id.clone(),
                found: group.group_id,
            });
        }

        let _guard = self.write_lock.lock().await;
        let current = self.load(group_id).await?;
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict {
                current_version: current.version,
            });
        }

        let version = expected_version + 1;
        group.version = version;
        self.write_record(&group).await?;
        Ok(CasOutcome::Committed { version })
    }

    async fn delete(&self, group_id: &GroupId, expected_version: u64) -> StoreResult<CasOutcome> {
        let _guard = self.write_lock.lock().await;
        let current = self.load(group_id).await?;
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict {
                current_version: current.version,
            });
        }

        fs::remove_file(self.record_path(group_id)).await?;
        self.sync_dir().await?;
        Ok(CasOutcome::Committed {
            version: expected_version,
        })
    }

    async fn list_group_ids(&self) -> StoreResult<Vec<GroupId>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Some(stem) = name.strip_suffix(".group") else {
                continue;
            };
            match GroupId::new(stem) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(file = name, error = %e, "skipping unrecognized record file"),
            }
        }

        ids.sort();
        Ok(ids)
    }
}
