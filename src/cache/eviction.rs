//! Eviction policy: decides which key leaves the memory tier next.
//!
//! Scores combine:
//! - Hit count weighted by priority class (valuable → keep)
//! - Entry age (old → evictable)
//! - Time since last access (idle → evictable)
//!
//! The [`EvictionIndex`] is a binary min-heap with a `key -> position` map, so
//! rescoring a key after a read is O(log n) and the next victim is O(1).

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::cache::clock::{seconds_between, Timestamp};
use crate::cache::entry::CacheEntry;

/// Floor for the logarithmic factors so young or just-read entries do not
/// divide by zero.
pub const SCORE_EPSILON: f64 = 1e-3;

/// Compute the evictability score of an entry. Lower = evicted sooner.
///
/// ```text
/// score = (hit_count × weight(priority)) /
///         (max(ln(age + 1), ε) × max(ln(recency + 1), ε))
/// ```
pub fn score(entry: &CacheEntry, now: Timestamp) -> f64 {
    let age_secs = seconds_between(entry.created_at, now);
    let recency_secs = seconds_between(entry.last_accessed_at, now);

    let age_factor = (age_secs + 1.0).ln().max(SCORE_EPSILON);
    let recency_factor = (recency_secs + 1.0).ln().max(SCORE_EPSILON);

    (entry.hit_count as f64 * entry.priority.weight()) / (age_factor * recency_factor)
}

/// Position of a key in eviction order.
#[derive(Debug, Clone, Copy)]
pub struct Rank {
    pub score: f64,
    pub created_at: Timestamp,
    pub seq: u64,
}

impl Rank {
    pub fn of(entry: &CacheEntry, now: Timestamp) -> Self {
        Self {
            score: score(entry, now),
            created_at: entry.created_at,
            seq: entry.seq,
        }
    }
}

// Lower score first; ties go to the oldest entry, then the earliest insert.
impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.created_at.cmp(&other.created_at))
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    key: String,
    rank: Rank,
}

/// Indexed min-heap over live keys.
#[derive(Debug, Default)]
pub struct EvictionIndex {
    heap: Vec<Slot>,
    positions: HashMap<String, usize>,
}

impl EvictionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key or move it to its new rank.
    pub fn insert_or_update(&mut self, key: &str, rank: Rank) {
        if let Some(&pos) = self.positions.get(key) {
            self.heap[pos].rank = rank;
            let pos = self.sift_up(pos);
            self.sift_down(pos);
            return;
        }

        let pos = self.heap.len();
        self.heap.push(Slot {
            key: key.to_string(),
            rank,
        });
        self.positions.insert(key.to_string(), pos);
        self.sift_up(pos);
    }

    /// Remove a key. Returns false if it was not indexed.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(pos) = self.positions.remove(key) else {
            return false;
        };

        let last = self.heap.len() - 1;
        if pos != last {
            self.heap.swap(pos, last);
            self.positions.insert(self.heap[pos].key.clone(), pos);
        }
        self.heap.pop();

        if pos < self.heap.len() {
            let pos = self.sift_up(pos);
            self.sift_down(pos);
        }
        true
    }

    /// The most evictable key.
    pub fn peek_min(&self) -> Option<&str> {
        self.heap.first().map(|slot| slot.key.as_str())
    }

    /// Remove and return the most evictable key.
    pub fn pop_min(&mut self) -> Option<String> {
        let key = self.peek_min()?.to_string();
        self.remove(&key);
        Some(key)
    }

    pub fn rank(&self, key: &str) -> Option<Rank> {
        self.positions.get(key).map(|&pos| self.heap[pos].rank)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].key.clone(), a);
        self.positions.insert(self.heap[b].key.clone(), b);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].rank >= self.heap[parent].rank {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) -> usize {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;

            if left < len && self.heap[left].rank < self.heap[smallest].rank {
                smallest = left;
            }
            if right < len && self.heap[right].rank < self.heap[smallest].rank {
                smallest = right;
            }
            if smallest == pos {
                return pos;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}
