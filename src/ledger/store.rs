use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::error::{LedgerError, Result};
use super::partitions::{
    METADATA_PARTITION, META_LAST_SAVE, SNAPSHOTS_PARTITION, TASK_MAP, encode_meta_key,
    encode_snapshot_key,
};

/// Durable load/save of the whole task map as one opaque blob
pub trait PersistenceStore: Send + Sync {
    fn save(&self, blob: &[u8]) -> Result<()>;

    /// `None` when nothing was ever saved
    fn load(&self) -> Result<Option<Vec<u8>>>;
}

/// Fjall-backed persistent store
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    snapshots: PartitionHandle,
    metadata: PartitionHandle,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let snapshots =
            keyspace.open_partition(SNAPSHOTS_PARTITION, PartitionCreateOptions::default())?;
        let metadata =
            keyspace.open_partition(METADATA_PARTITION, PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self {
            keyspace,
            snapshots,
            metadata,
        })
    }

    /// Unix time of the last successful save, if any
    pub fn last_saved(&self) -> Result<Option<i64>> {
        Ok(self
            .metadata
            .get(encode_meta_key(META_LAST_SAVE))?
            .and_then(|bytes| std::str::from_utf8(&bytes).ok()?.parse().ok()))
    }
}

impl PersistenceStore for FjallStore {
    fn save(&self, blob: &[u8]) -> Result<()> {
        self.snapshots.insert(encode_snapshot_key(TASK_MAP), blob)?;
        let now = chrono::Utc::now().timestamp().to_string();
        self.metadata
            .insert(encode_meta_key(META_LAST_SAVE), now.as_bytes())?;
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        debug!(size = blob.len(), "Task map saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self
            .snapshots
            .get(encode_snapshot_key(TASK_MAP))?
            .map(|value| value.to_vec()))
    }
}

/// In-process store for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<Vec<u8>>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every following save fail with an I/O error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PersistenceStore for MemoryStore {
    fn save(&self, blob: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Io(std::io::Error::other(
                "memory store is failing",
            )));
        }
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = Some(blob.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blob.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
