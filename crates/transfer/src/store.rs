//! Checkpoint persistence keyed by tracked-upload id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::TransferError;
use crate::checkpoint::Checkpoint;

/// Key/value store for resumption checkpoints.
///
/// Implementations must never fail the caller: persistence problems
/// (quota, serialization, I/O) are logged and the operation becomes a
/// no-op, so a broken store only costs resumability.
pub trait CheckpointStore: Send + Sync {
    /// Saves (or replaces) the checkpoint for `id`.
    fn save(&self, id: &str, checkpoint: &Checkpoint);

    /// Returns the checkpoint for `id`, if any.
    fn load(&self, id: &str) -> Option<Checkpoint>;

    /// Removes the checkpoint for `id`.
    fn delete(&self, id: &str);
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Checkpoints cached in memory and persisted to a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, Checkpoint>>,
    /// Held across snapshot, write and rename so files land in order.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading existing checkpoints.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is
    /// logged and also starts empty; it is overwritten on the next save.
    pub fn open(path: PathBuf) -> Self {
        let entries = match load_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable checkpoint file");
                HashMap::new()
            }
        };
        Self {
            path,
            entries: RwLock::new(entries),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns all ids with a stored checkpoint.
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Writes the current entries to disk via a temporary file.
    fn persist(&self) -> Result<(), TransferError> {
        let _writing = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let json = {
            let map = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string(&*map)?
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn persist_or_warn(&self, id: &str) {
        if let Err(e) = self.persist() {
            warn!(id = %id, path = %self.path.display(), error = %e, "failed to persist checkpoints");
        }
    }
}

impl CheckpointStore for JsonFileStore {
    fn save(&self, id: &str, checkpoint: &Checkpoint) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), checkpoint.clone());
        self.persist_or_warn(id);
    }

    fn load(&self, id: &str) -> Option<Checkpoint> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn delete(&self, id: &str) {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            self.persist_or_warn(id);
        }
    }
}

fn load_entries(path: &Path) -> Result<HashMap<String, Checkpoint>, TransferError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    let entries: HashMap<String, Checkpoint> = serde_json::from_str(&data)?;
    debug!("loaded {} checkpoint(s) from {:?}", entries.len(), path);
    Ok(entries)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local checkpoint store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a checkpoint is stored for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Checkpoint>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CheckpointStore for MemoryStore {
    fn save(&self, id: &str, checkpoint: &Checkpoint) {
        self.lock().insert(id.to_string(), checkpoint.clone());
    }

    fn load(&self, id: &str) -> Option<Checkpoint> {
        self.lock().get(id).cloned()
    }

    fn delete(&self, id: &str) {
        self.lock().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CompletedPart;

    fn sample(session: &str) -> Checkpoint {
        let mut cp = Checkpoint::new(session.into(), "dir/v.mp4".into(), 8, 4);
        cp.done_parts.push(CompletedPart {
            number: 1,
            etag: "e1".into(),
        });
        cp
    }

    #[test]
    fn json_store_save_load_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(tmp.path().join("checkpoints.json"));

        assert!(store.load("a").is_none());
        store.save("a", &sample("s1"));
        assert_eq!(store.load("a").unwrap().session_id, "s1");

        store.save("a", &sample("s2"));
        assert_eq!(store.load("a").unwrap().session_id, "s2");

        store.delete("a");
        assert!(store.load("a").is_none());
    }

    #[test]
    fn json_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("checkpoints.json");

        {
            let store = JsonFileStore::open(path.clone());
            store.save("a", &sample("s1"));
            store.save("b", &sample("s2"));
            store.delete("b");
        }

        let reopened = JsonFileStore::open(path);
        assert_eq!(reopened.load("a").unwrap(), sample("s1"));
        assert!(reopened.load("b").is_none());
        assert_eq!(reopened.ids(), vec!["a".to_string()]);
    }

    #[test]
    fn json_store_tolerates_corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("checkpoints.json");
        std::fs::write(&path, "{ definitely not json").unwrap();

        let store = JsonFileStore::open(path.clone());
        assert!(store.ids().is_empty());

        store.save("a", &sample("s1"));
        let reopened = JsonFileStore::open(path);
        assert!(reopened.load("a").is_some());
    }

    #[test]
    fn json_store_unwritable_path_does_not_fail() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail.
        let path = tmp.path().join("occupied");
        std::fs::create_dir_all(path.join("x")).unwrap();

        let store = JsonFileStore::open(path);
        store.save("a", &sample("s1"));
        // Still served from memory.
        assert!(store.load("a").is_some());
        store.delete("a");
        assert!(store.load("a").is_none());
    }

    #[test]
    fn json_store_concurrent_writers_leave_latest_state() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("checkpoints.json");
        let store = JsonFileStore::open(path.clone());

        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..50 {
                        let id = format!("t{t}-{}", i % 5);
                        store.save(&id, &sample(&format!("s{i}")));
                        if i % 2 == 0 {
                            store.delete(&id);
                        }
                    }
                });
            }
        });

        let mut expected = store.ids();
        let mut on_disk = JsonFileStore::open(path).ids();
        expected.sort();
        on_disk.sort();
        assert_eq!(on_disk, expected);
        assert!(!tmp.path().join("checkpoints.json.tmp").exists());
    }

    #[test]
    fn memory_store_partitioned_by_id() {
        let store = MemoryStore::new();
        store.save("a", &sample("s1"));
        store.save("b", &sample("s2"));
        assert_eq!(store.len(), 2);

        store.delete("a");
        assert!(!store.contains("a"));
        assert_eq!(store.load("b").unwrap().session_id, "s2");
    }
}
