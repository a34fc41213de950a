//! Persistent store backends.
//!
//! [`JsonFileStore`] keeps every record in one namespaced JSON blob, keyed by
//! cache key, and rewrites the blob on each mutation through a temp file so a
//! crash never leaves a half-written store behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::{PersistedRecord, PersistenceError};

#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Every stored record. Called once at engine start-up.
    async fn load_all(&self) -> Result<Vec<(String, PersistedRecord)>, PersistenceError>;

    async fn save(&self, key: &str, record: &PersistedRecord) -> Result<(), PersistenceError>;

    async fn delete(&self, key: &str) -> Result<(), PersistenceError>;

    async fn clear(&self) -> Result<(), PersistenceError>;
}

type Blob = BTreeMap<String, PersistedRecord>;

/// File-backed store: one JSON object per namespace.
pub struct JsonFileStore {
    path: PathBuf,
    /// In-process mirror of the blob.
    records: Mutex<Blob>,
}

impl JsonFileStore {
    /// Open (or create) the blob at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let records = match fs::read(&path).await {
            Ok(data) if data.is_empty() => Blob::new(),
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Blob::new(),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        debug!(path = %path.display(), records = records.len(), "Opened store blob");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_blob(&self, records: &Blob) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec(records)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, &data)
            .await
            .map_err(|source| PersistenceError::Io {
                path: tmp.clone(),
                source,
            })?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), size = data.len(), "Wrote store blob");
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<(String, PersistedRecord)>, PersistenceError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }

    async fn save(&self, key: &str, record: &PersistedRecord) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().await;
        records.insert(key.to_string(), record.clone());
        self.write_blob(&records).await
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().await;
        if records.remove(key).is_none() {
            return Ok(());
        }
        self.write_blob(&records).await
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().await;
        records.clear();
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Process-local store, for tests and embedders without a filesystem.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Blob>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.records.lock().await.contains_key(key)
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<(String, PersistedRecord)>, PersistenceError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }

    async fn save(&self, key: &str, record: &PersistedRecord) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .await
            .insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.records.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        self.records.lock().await.clear();
        Ok(())
    }
}
