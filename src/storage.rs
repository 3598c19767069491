/// Record storage for the coordination board.
///
/// This module defines the storage seam of taskmesh. The board does not own
/// a concrete backend; it is handed an injected [`RecordStore`] handle at
/// construction time. Any networked key-value service that can do point
/// get/set/delete plus a scan of non-terminal records can sit behind the
/// trait; connection lifecycle (connect/disconnect, credentials) belongs to
/// the adapter, not to this crate.
///
/// [`MemoryStore`] is the reference implementation: an in-process,
/// thread-safe map used by tests, demos, and single-process deployments.
/// It is lock-free for concurrent access via DashMap, so per-key writes are
/// atomic with respect to `list_active` - a reader never observes a
/// half-written record.
use crate::error::MeshResult;
#[cfg(test)]
use crate::error::MeshError;
use crate::types::{ActionKey, ActionRecord};
use async_trait::async_trait;
use dashmap::DashMap;

/// Storage backend for action records.
///
/// Implementations must serialize concurrent writes to the same key
/// (last-write-wins; no merge) and must never expose a partially-written
/// record to readers. Methods are async because real backends are
/// networked; the in-memory implementation completes immediately.
///
/// Backend failures surface as [`MeshError::Store`]; the board decides
/// whether to retry (it retries idempotent reads only).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upsert a record, overwriting any existing payload entirely.
    async fn set(&self, record: ActionRecord) -> MeshResult<()>;

    /// Point lookup. `Ok(None)` means the key has never been written (or
    /// was deleted); absence is not an error at this layer.
    async fn get(&self, key: &ActionKey) -> MeshResult<Option<ActionRecord>>;

    /// Remove a record. Idempotent: deleting a missing key succeeds.
    async fn delete(&self, key: &ActionKey) -> MeshResult<()>;

    /// All records whose status is not terminal. Ordering is unspecified;
    /// callers must not rely on it.
    async fn list_active(&self) -> MeshResult<Vec<ActionRecord>>;
}

/// In-process record store backed by a concurrent map.
///
/// Retains completed records until they are explicitly deleted, so
/// completed work stays retrievable by waiters indefinitely. Callers are
/// responsible for cleanup policy (there is no automatic expiry).
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<ActionKey, ActionRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Number of records currently held, terminal ones included.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Distinct agent ids present in the store, sorted.
    pub fn list_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self
            .records
            .iter()
            .map(|entry| entry.key().agent_id.clone())
            .collect();

        agents.sort();
        agents.dedup();
        agents
    }

    /// Snapshot every record for persistence.
    ///
    /// This is a point-in-time copy; writes that land while the snapshot is
    /// being taken may or may not be included.
    pub fn snapshot(&self) -> Vec<ActionRecord> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Rebuild a store from a snapshot taken with [`MemoryStore::snapshot`].
    pub fn from_snapshot(records: Vec<ActionRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.records.insert(record.key.clone(), record);
        }
        store
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn set(&self, record: ActionRecord) -> MeshResult<()> {
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn get(&self, key: &ActionKey) -> MeshResult<Option<ActionRecord>> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &ActionKey) -> MeshResult<()> {
        self.records.remove(key);
        Ok(())
    }

    async fn list_active(&self) -> MeshResult<Vec<ActionRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| !entry.value().is_terminal())
            .map(|entry| entry.value().clone())
            .collect())
    }
}

/// A store wrapper that fails every call, for exercising error paths.
///
/// Only compiled for tests; keeps failure-injection out of production code
/// while letting the board and aggregator test their degraded behavior.
#[cfg(test)]
pub(crate) struct FailingStore;

#[cfg(test)]
#[async_trait]
impl RecordStore for FailingStore {
    async fn set(&self, _record: ActionRecord) -> MeshResult<()> {
        Err(MeshError::store("injected failure"))
    }

    async fn get(&self, _key: &ActionKey) -> MeshResult<Option<ActionRecord>> {
        Err(MeshError::store("injected failure"))
    }

    async fn delete(&self, _key: &ActionKey) -> MeshResult<()> {
        Err(MeshError::store("injected failure"))
    }

    async fn list_active(&self) -> MeshResult<Vec<ActionRecord>> {
        Err(MeshError::store("injected failure"))
    }
}
