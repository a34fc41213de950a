//! Durable tier.
//!
//! - [`store`]: the [`PersistentStore`] trait, a JSON blob store and an in-memory store
//! - [`write_behind`]: ordered queue applying writes after the in-memory mutation

pub mod store;
pub mod write_behind;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::clock::{self, Timestamp};
use crate::cache::codec::StoredValue;
use crate::cache::entry::{CacheEntry, PriorityClass};

pub use store::{JsonFileStore, MemoryStore, PersistentStore};
pub use write_behind::WriteBehind;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt store blob: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Write-behind queue is closed")]
    QueueClosed,
}

/// On-disk form of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub value: StoredValue,
    pub created_at: Timestamp,
    pub ttl_ms: u64,
    pub priority_class: PriorityClass,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub size_bytes: usize,
}

impl PersistedRecord {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            value: entry.value.clone(),
            created_at: entry.created_at,
            ttl_ms: clock::as_millis(entry.ttl),
            priority_class: entry.priority,
            tags: entry.tags.clone(),
            size_bytes: entry.size_bytes,
        }
    }

    /// Discard rule on load: `created_at + ttl < now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.created_at.saturating_add(self.ttl_ms) < now
    }

    /// Rehydrate into a fresh entry. Read statistics are not persisted.
    pub fn into_entry(self, key: String) -> CacheEntry {
        CacheEntry::new(
            key,
            self.value,
            self.created_at,
            Duration::from_millis(self.ttl_ms),
            self.priority_class,
            self.tags,
            self.size_bytes,
        )
    }
}
