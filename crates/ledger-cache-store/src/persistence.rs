//! Durable snapshot storage.
//!
//! The whole key→entry map is written as one JSON document on every
//! mutation and read once when the store is opened.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// Persisted form of one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub data: Value,
    /// Insertion time, unix milliseconds.
    pub timestamp: i64,
    /// Lifetime in milliseconds.
    pub ttl: u64,
}

/// Full persisted map, ordered by key.
pub type Snapshot = BTreeMap<String, PersistedEntry>;

/// Backend that stores the snapshot document.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Reads the last saved snapshot. `None` if nothing was ever saved.
    async fn load(&self) -> Result<Option<Snapshot>, StorageError>;

    /// Replaces the stored snapshot.
    async fn save(&self, snapshot: Snapshot) -> Result<(), StorageError>;

    /// Name used in log lines.
    fn name(&self) -> &str {
        "storage"
    }
}

/// Stores the snapshot as a JSON file, replacing it atomically.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> Result<Option<Snapshot>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path).map_err(|source| StorageError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(StorageError::Parse)
    }

    fn write_file(path: &Path, snapshot: &Snapshot) -> Result<(), StorageError> {
        let display = path.display().to_string();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StorageError::Write {
                path: display.clone(),
                source,
            })?;
        }

        let json = serde_json::to_vec(snapshot).map_err(StorageError::Serialize)?;

        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);
        let temp_display = temp_path.display().to_string();

        let mut file = fs::File::create(&temp_path).map_err(|source| StorageError::Write {
            path: temp_display.clone(),
            source,
        })?;
        file.write_all(&json).map_err(|source| StorageError::Write {
            path: temp_display.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| StorageError::Write {
            path: temp_display.clone(),
            source,
        })?;

        fs::rename(&temp_path, path).map_err(|source| StorageError::Rename {
            from: temp_display,
            to: display,
            source,
        })
    }
}

#[async_trait]
impl SnapshotStorage for JsonFileStorage {
    async fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_file(&path))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn save(&self, snapshot: Snapshot) -> Result<(), StorageError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::write_file(&path, &snapshot))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

/// In-memory storage for tests and sessions that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    snapshot: Mutex<Option<Snapshot>>,
    saves: Mutex<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage that already holds `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// Returns a copy of the last saved snapshot.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.lock().clone()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl SnapshotStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save(&self, snapshot: Snapshot) -> Result<(), StorageError> {
        *self.snapshot.lock() = Some(snapshot);
        *self.saves.lock() += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "token-support:0xabc".to_string(),
            PersistedEntry {
                data: json!(true),
                timestamp: 1_700_000_000_000,
                ttl: 60_000,
            },
        );
        snapshot
    }

    #[tokio::test]
    async fn test_file_storage_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("cache.json"));

        assert!(storage.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let storage = JsonFileStorage::new(&path);

        storage.save(sample()).await.unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("nested").join("cache.json.tmp").exists());
        assert_eq!(storage.load().await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn test_file_storage_uses_persisted_field_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let storage = JsonFileStorage::new(&path);

        storage.save(sample()).await.unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &raw["token-support:0xabc"];
        assert_eq!(entry["data"], json!(true));
        assert_eq!(entry["timestamp"], json!(1_700_000_000_000_i64));
        assert_eq!(entry["ttl"], json!(60_000));
    }

    #[tokio::test]
    async fn test_file_storage_corrupt_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();

        let err = JsonFileStorage::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Parse(_)));
    }

    #[tokio::test]
    async fn test_memory_storage_counts_saves() {
        let storage = MemoryStorage::new();
        assert!(storage.load().await.unwrap().is_none());

        storage.save(sample()).await.unwrap();
        storage.save(Snapshot::new()).await.unwrap();

        assert_eq!(storage.save_count(), 2);
        assert_eq!(storage.snapshot(), Some(Snapshot::new()));
    }
}
