/// Persistence for the in-process record store.
///
/// This module serializes a [`MemoryStore`]'s records to disk and restores
/// them, so a coordination board survives a process restart. The format is
/// a single JSON snapshot with a version number; there is no guarantee
/// beyond round-tripping the current state (history is not retained -
/// records are last-write-wins).
///
/// Writes go to a temporary file first, then an atomic rename, so a crash
/// mid-save never leaves a torn snapshot behind.
///
/// # Usage
///
/// ```ignore
/// // Save the store to disk
/// persistence::save(&store, &path).await?;
///
/// // Restore it later
/// let store = persistence::load(&path).await?;
/// ```
use crate::error::{MeshError, MeshResult};
use crate::storage::MemoryStore;
use crate::types::ActionRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Serializable snapshot of the store.
#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    /// Format version for future compatibility
    version: u32,
    /// Every record, terminal ones included
    records: Vec<ActionRecord>,
}

const SNAPSHOT_VERSION: u32 = 1;

/// Save the store's records to disk.
///
/// Takes a point-in-time snapshot; writes that land while the snapshot is
/// being taken may not be included.
///
/// # Errors
///
/// Returns `MeshError::Store` if the directory cannot be created, the
/// snapshot cannot be serialized, or the atomic rename fails.
pub async fn save(store: &MemoryStore, path: &Path) -> MeshResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| MeshError::store(format!("Failed to create directory: {}", e)))?;
    }

    let snapshot = StoreSnapshot {
        version: SNAPSHOT_VERSION,
        records: store.snapshot(),
    };

    let bytes = serde_json::to_vec(&snapshot)
        .map_err(|e| MeshError::store(format!("Failed to serialize snapshot: {}", e)))?;

    // Write to a temporary file, then rename into place.
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, &bytes)
        .await
        .map_err(|e| MeshError::store(format!("Failed to write snapshot: {}", e)))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|e| MeshError::store(format!("Failed to move snapshot into place: {}", e)))?;

    Ok(())
}

/// Restore a store from a snapshot written by [`save`].
///
/// # Errors
///
/// Returns `MeshError::Store` if the file cannot be read, is not a valid
/// snapshot, or carries an unsupported format version.
pub async fn load(path: &Path) -> MeshResult<MemoryStore> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| MeshError::store(format!("Failed to read snapshot: {}", e)))?;

    let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)
        .map_err(|e| MeshError::store(format!("Failed to parse snapshot: {}", e)))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(MeshError::store(format!(
            "Unsupported snapshot version {} (expected {})",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }

    Ok(MemoryStore::from_snapshot(snapshot.records))
}
