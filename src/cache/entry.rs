//! Cache entry types.
//!
//! An entry is the unit of storage, eviction, expiry and persistence.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::clock::{self, Timestamp};
use crate::cache::codec::StoredValue;

/// Caller-assigned importance of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityClass {
    High,
    #[default]
    Normal,
    Low,
}

impl PriorityClass {
    /// Multiplier applied to the hit count when scoring.
    pub fn weight(&self) -> f64 {
        match self {
            PriorityClass::High => 3.0,
            PriorityClass::Normal => 2.0,
            PriorityClass::Low => 1.0,
        }
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityClass::High => write!(f, "HIGH"),
            PriorityClass::Normal => write!(f, "NORMAL"),
            PriorityClass::Low => write!(f, "LOW"),
        }
    }
}

impl std::str::FromStr for PriorityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HIGH" => Ok(PriorityClass::High),
            "NORMAL" => Ok(PriorityClass::Normal),
            "LOW" => Ok(PriorityClass::Low),
            other => Err(format!("unknown priority class: {other}")),
        }
    }
}

/// A single cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,

    /// Stored payload; the variant records whether it is compressed.
    pub value: StoredValue,

    pub created_at: Timestamp,

    pub last_accessed_at: Timestamp,

    /// Resolved TTL (the engine default has already been applied).
    pub ttl: Duration,

    pub priority: PriorityClass,

    /// Successful reads since creation.
    pub hit_count: u64,

    pub tags: BTreeSet<String>,

    /// Estimated size of the decoded value, fixed at write time.
    pub size_bytes: usize,

    /// Insertion sequence number, assigned by the memory tier.
    pub seq: u64,
}

impl CacheEntry {
    pub fn new(
        key: String,
        value: StoredValue,
        now: Timestamp,
        ttl: Duration,
        priority: PriorityClass,
        tags: BTreeSet<String>,
        size_bytes: usize,
    ) -> Self {
        Self {
            key,
            value,
            created_at: now,
            last_accessed_at: now,
            ttl,
            priority,
            hit_count: 0,
            tags,
            size_bytes,
            seq: 0,
        }
    }

    /// Whether `now - created_at > ttl`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.saturating_sub(self.created_at) as u128 > self.ttl.as_millis()
    }

    /// Record a successful read.
    pub fn touch(&mut self, now: Timestamp) {
        self.hit_count += 1;
        self.last_accessed_at = now;
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            key: self.key.clone(),
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            ttl_ms: clock::as_millis(self.ttl),
            priority: self.priority,
            hit_count: self.hit_count,
            tags: self.tags.iter().cloned().collect(),
            size_bytes: self.size_bytes,
            compressed: self.value.is_compressed(),
        }
    }
}

/// Metadata snapshot of an entry, without its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
    pub ttl_ms: u64,
    pub priority: PriorityClass,
    pub hit_count: u64,
    pub tags: Vec<String>,
    pub size_bytes: usize,
    pub compressed: bool,
}
