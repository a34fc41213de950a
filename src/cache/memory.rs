//! Memory tier: the bounded key → entry table.
//!
//! The tier owns the [`EvictionIndex`]; every entry in `entries` is indexed
//! and vice versa. When a put would exceed `max_entries` or `max_bytes`, the
//! lowest-ranked keys are evicted until it fits. Evicted entries are handed
//! back to the caller, which mirrors the removal to the other tiers.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::clock::Timestamp;
use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;
use crate::cache::eviction::{EvictionIndex, Rank};

pub struct MemoryTier {
    entries: HashMap<String, CacheEntry>,
    index: EvictionIndex,
    max_entries: usize,
    max_bytes: Option<usize>,
    total_bytes: usize,
    next_seq: u64,
}

impl MemoryTier {
    pub fn new(max_entries: usize, max_bytes: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            index: EvictionIndex::new(),
            max_entries,
            max_bytes,
            total_bytes: 0,
            next_seq: 0,
        }
    }

    /// Store an entry, replacing any entry with the same key.
    ///
    /// Returns the entries evicted to make room. An entry that could never
    /// fit the byte budget is rejected and the tier is left untouched.
    pub fn put(
        &mut self,
        mut entry: CacheEntry,
        now: Timestamp,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        if let Some(budget) = self.max_bytes {
            if entry.size_bytes > budget {
                return Err(CacheError::CapacityExhausted {
                    key: entry.key,
                    size_bytes: entry.size_bytes,
                    budget_bytes: budget,
                });
            }
        }

        // Replacing a key is not an eviction.
        self.remove(&entry.key);

        let mut evicted = Vec::new();
        while self.entries.len() >= self.max_entries || self.exceeds_bytes(entry.size_bytes) {
            let Some(victim) = self.index.peek_min().map(str::to_string) else {
                break;
            };
            if let Some(removed) = self.remove(&victim) {
                debug!(key = %removed.key, size = removed.size_bytes, "Evicted entry");
                evicted.push(removed);
            }
        }

        entry.seq = self.next_seq;
        self.next_seq += 1;

        self.index.insert_or_update(&entry.key, Rank::of(&entry, now));
        self.total_bytes += entry.size_bytes;
        self.entries.insert(entry.key.clone(), entry);

        Ok(evicted)
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Record a hit on `key` and rescore it. Returns the updated entry.
    pub fn touch(&mut self, key: &str, now: Timestamp) -> Option<&CacheEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.touch(now);
        self.index.insert_or_update(key, Rank::of(entry, now));
        Some(entry)
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.index.remove(key);
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// Keys whose TTL has elapsed at `now`.
    pub fn expired_keys(&self, now: Timestamp) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn keys_with_tag(&self, tag: &str) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| entry.has_tag(tag))
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// The key the next capacity eviction would remove.
    pub fn next_victim(&self) -> Option<&str> {
        self.index.peek_min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.total_bytes = 0;
    }

    fn exceeds_bytes(&self, incoming: usize) -> bool {
        match self.max_bytes {
            Some(budget) => self.total_bytes + incoming > budget,
            None => false,
        }
    }
}
