//! Cache engine: the public face of the cache.
//!
//! The engine orchestrates a write through the codec, the memory tier (which
//! evicts by score when full), the write-behind queue and the notifier. Reads
//! validate TTL lazily, update recency and rescore the entry.
//!
//! The memory tier, its eviction index and the statistics sit behind one
//! mutex, so each operation is atomic with respect to all three. Persistence
//! and notification are queued while the lock is held, which keeps their
//! order identical to the in-memory order, and applied by their own tasks.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::codec::Codec;
use crate::cache::entry::{CacheEntry, EntryInfo, PriorityClass};
use crate::cache::error::CacheError;
use crate::cache::memory::MemoryTier;
use crate::cache::notifier::{CacheEvent, Notifier, Subscription};
use crate::cache::size;
use crate::config::Config;
use crate::storage::{JsonFileStore, PersistedRecord, PersistentStore, WriteBehind};

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Value),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_option(self) -> Option<Value> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Treat any cached value as stale: evict it and report a miss.
    pub force_fresh: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// `None` or zero uses the engine default.
    pub ttl: Option<Duration>,
    pub priority: PriorityClass,
    pub tags: Vec<String>,
    /// Compress this value regardless of `compression.enabled`; `None` follows the config.
    pub compress: Option<bool>,
}

impl SetOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_priority(mut self, priority: PriorityClass) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }
}

/// Operation counters, reset by [`CacheEngine::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    /// Capacity evictions and expirations; explicit deletes are not counted.
    pub evictions: u64,
    pub writes: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

/// Point-in-time view returned by [`CacheEngine::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writes: u64,
    pub hit_rate: f64,
    pub entry_count: usize,
    pub approx_memory_bytes: usize,
}

/// Why an entry left the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Deleted,
    Evicted,
    Expired,
}

struct EngineState {
    tier: MemoryTier,
    stats: CacheStatistics,
}

pub struct CacheEngine {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    codec: Codec,
    default_ttl: Duration,
    state: Mutex<EngineState>,
    notifier: Notifier,
    writer: Option<WriteBehind>,
}

impl CacheEngine {
    /// Open an engine on the wall clock, with the file store when durability
    /// is enabled. A store that cannot be opened degrades to memory-only.
    pub async fn open(config: Arc<Config>) -> Result<Self, CacheError> {
        config.validate()?;

        let store: Option<Arc<dyn PersistentStore>> = if config.persistence.durable {
            match JsonFileStore::open(config.store_path()).await {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    warn!(
                        path = %config.store_path().display(),
                        error = %e,
                        "Persistent store unavailable, running memory-only"
                    );
                    None
                }
            }
        } else {
            None
        };

        Self::open_with(config, Arc::new(SystemClock), store).await
    }

    /// Open an engine with an explicit clock and store.
    ///
    /// Records found in `store` are loaded into memory, oldest first; records
    /// whose TTL has elapsed are purged from the store instead.
    pub async fn open_with(
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        store: Option<Arc<dyn PersistentStore>>,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        let engine = Self {
            codec: Codec::new(config.compression.clone()),
            default_ttl: config.default_ttl(),
            state: Mutex::new(EngineState {
                tier: MemoryTier::new(config.cache.max_entries, config.cache.max_bytes),
                stats: CacheStatistics::default(),
            }),
            notifier: Notifier::spawn(),
            writer: store.clone().map(WriteBehind::spawn),
            clock,
            config,
        };

        if let Some(store) = store {
            match store.load_all().await {
                Ok(records) => engine.restore(records).await,
                Err(e) => warn!(error = %e, "Failed to load persisted entries"),
            }
        }

        info!(
            max_entries = engine.config.cache.max_entries,
            max_bytes = ?engine.config.cache.max_bytes,
            default_ttl_secs = engine.default_ttl.as_secs(),
            durable = engine.writer.is_some(),
            compression = engine.codec.enabled(),
            "Cache engine opened"
        );

        Ok(engine)
    }

    async fn restore(&self, mut records: Vec<(String, PersistedRecord)>) {
        let Some(writer) = &self.writer else {
            return;
        };

        records.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(&b.0)));

        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let (mut restored, mut purged) = (0usize, 0usize);

        for (key, record) in records {
            if record.is_expired(now) {
                writer.delete(&key);
                purged += 1;
                continue;
            }

            match state.tier.put(record.into_entry(key.clone()), now) {
                Ok(evicted) => {
                    for victim in evicted {
                        writer.delete(&victim.key);
                        restored = restored.saturating_sub(1);
                        purged += 1;
                    }
                    restored += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Persisted entry no longer fits, purging");
                    writer.delete(&key);
                    purged += 1;
                }
            }
        }

        info!(restored, purged, "Warmed memory tier from persistent store");
    }

    /// Read a key.
    pub async fn get(&self, key: &str) -> Lookup {
        self.get_with(key, GetOptions::default()).await
    }

    /// Read a key, optionally forcing a refresh.
    pub async fn get_with(&self, key: &str, options: GetOptions) -> Lookup {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = self.clock.now();

        let outcome = match state.tier.get(key) {
            None => None,
            Some(entry) if entry.is_expired(now) => Some(Err(Removal::Expired)),
            Some(_) if options.force_fresh => Some(Err(Removal::Evicted)),
            Some(entry) => Some(self.codec.unpack(&entry.value).map_err(|e| {
                warn!(key = %key, error = %e, "Decompression failed, dropping entry");
                Removal::Evicted
            })),
        };

        match outcome {
            Some(Ok(value)) => {
                state.tier.touch(key, now);
                state.stats.hits += 1;
                Lookup::Hit(value)
            }
            Some(Err(cause)) => {
                if let Some(entry) = state.tier.remove(key) {
                    self.retire(&mut state.stats, entry, cause);
                }
                state.stats.misses += 1;
                Lookup::Miss
            }
            None => {
                state.stats.misses += 1;
                Lookup::Miss
            }
        }
    }

    /// Write a key, replacing any existing value.
    ///
    /// Fails only when the value can never fit the configured byte budget;
    /// the previous value, if any, is then left in place.
    pub async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<(), CacheError> {
        let size_bytes = size::estimate(&value);
        let announced = self.notifier.has_subscribers(key).then(|| value.clone());
        let stored = self.codec.pack(value, options.compress);
        let ttl = options
            .ttl
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(self.default_ttl);
        let tags: BTreeSet<String> = options.tags.into_iter().collect();

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = self.clock.now();

        let entry = CacheEntry::new(
            key.to_string(),
            stored,
            now,
            ttl,
            options.priority,
            tags,
            size_bytes,
        );
        let record = self
            .writer
            .as_ref()
            .map(|_| PersistedRecord::from_entry(&entry));

        let evicted = match state.tier.put(entry, now) {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!(key = %key, error = %e, "Rejected write");
                return Err(e);
            }
        };
        for victim in evicted {
            self.retire(&mut state.stats, victim, Removal::Evicted);
        }
        state.stats.writes += 1;

        if let (Some(writer), Some(record)) = (&self.writer, record) {
            writer.save(key, record);
        }
        // Subscribed while this write waited for the lock.
        let announced = announced.or_else(|| {
            self.notifier
                .has_subscribers(key)
                .then(|| state.tier.get(key))
                .flatten()
                .and_then(|entry| self.codec.unpack(&entry.value).ok())
        });
        if let Some(value) = announced {
            self.notifier.publish(key, CacheEvent::Updated(value));
        }

        debug!(key = %key, size = size_bytes, priority = %options.priority, "Stored entry");
        Ok(())
    }

    /// Remove a key from every tier. Absent keys are a no-op.
    pub async fn delete(&self, key: &str) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        match state.tier.remove(key) {
            Some(entry) => {
                self.retire(&mut state.stats, entry, Removal::Deleted);
                true
            }
            None => {
                if let Some(writer) = &self.writer {
                    writer.delete(key);
                }
                false
            }
        }
    }

    /// Remove every entry carrying `tag`. Returns how many were removed.
    pub async fn delete_by_tag(&self, tag: &str) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let keys = state.tier.keys_with_tag(tag);
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = state.tier.remove(&key) {
                self.retire(&mut state.stats, entry, Removal::Deleted);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(tag = %tag, removed, "Invalidated tag");
        }
        removed
    }

    /// Drop every entry and reset statistics.
    pub async fn clear(&self) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let keys: Vec<String> = state.tier.iter().map(|(key, _)| key.clone()).collect();
        state.tier.clear();
        state.stats = CacheStatistics::default();

        if let Some(writer) = &self.writer {
            writer.clear();
        }
        for key in &keys {
            self.notifier.publish(key, CacheEvent::Evicted);
        }

        info!(dropped = keys.len(), "Cache cleared");
    }

    /// Remove every expired entry. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = self.clock.now();

        let expired = state.tier.expired_keys(now);
        let mut removed = 0;
        for key in expired {
            if let Some(entry) = state.tier.remove(&key) {
                self.retire(&mut state.stats, entry, Removal::Expired);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(expired = removed, remaining = state.tier.len(), "Sweep complete");
        }
        removed
    }

    /// Read several keys. Results are in request order.
    pub async fn get_many<S: AsRef<str>>(&self, keys: &[S]) -> Vec<(String, Lookup)> {
        join_all(keys.iter().map(|key| async move {
            let key = key.as_ref();
            (key.to_string(), self.get(key).await)
        }))
        .await
    }

    /// Write several entries with default options.
    pub async fn warmup<I>(&self, entries: I) -> Vec<Result<(), CacheError>>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        join_all(
            entries
                .into_iter()
                .map(|(key, value)| async move { self.set(&key, value, SetOptions::default()).await }),
        )
        .await
    }

    /// Read several keys with the given freshness requirement.
    pub async fn preload<S: AsRef<str>>(&self, keys: &[S], force_fresh: bool) -> Vec<Lookup> {
        let options = GetOptions { force_fresh };
        join_all(keys.iter().map(|key| self.get_with(key.as_ref(), options))).await
    }

    /// Cache-aside read: on a miss, run `loader` and store what it returns.
    ///
    /// Loader errors are returned unchanged; a value that cannot be stored
    /// is still returned to the caller.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        key: &str,
        options: SetOptions,
        loader: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Lookup::Hit(value) = self.get(key).await {
            return Ok(value);
        }

        let value = loader().await?;
        if let Err(e) = self.set(key, value.clone(), options).await {
            warn!(key = %key, error = %e, "Loaded value not cached");
        }
        Ok(value)
    }

    /// Entry metadata without counting a read.
    pub async fn peek(&self, key: &str) -> Option<EntryInfo> {
        self.state.lock().await.tier.get(key).map(CacheEntry::info)
    }

    pub async fn stats(&self) -> StatsSnapshot {
        let state = self.state.lock().await;
        StatsSnapshot {
            hits: state.stats.hits,
            misses: state.stats.misses,
            evictions: state.stats.evictions,
            writes: state.stats.writes,
            hit_rate: state.stats.hit_rate(),
            entry_count: state.tier.len(),
            approx_memory_bytes: state.tier.total_size_bytes(),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.tier.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.tier.is_empty()
    }

    /// Register `callback` for events on `key`. Drop the handle to unsubscribe.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(key, callback)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.notifier.unsubscribe(subscription);
    }

    /// Wait for queued notifications and persistence writes to complete.
    pub async fn flush(&self) {
        self.notifier.flush().await;
        if let Some(writer) = &self.writer {
            if let Err(e) = writer.flush().await {
                warn!(error = %e, "Persistence flush failed");
            }
        }
    }

    /// Flush and stop the background tasks.
    pub async fn shutdown(&self) {
        self.flush().await;
        if let Some(writer) = &self.writer {
            writer.shutdown().await;
        }
        self.notifier.shutdown().await;
        info!("Cache engine stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_durable(&self) -> bool {
        self.writer.is_some()
    }

    /// Mirror a removal to the durable tier and the subscribers.
    fn retire(&self, stats: &mut CacheStatistics, entry: CacheEntry, cause: Removal) {
        if cause != Removal::Deleted {
            stats.evictions += 1;
        }
        if let Some(writer) = &self.writer {
            writer.delete(&entry.key);
        }

        let event = match cause {
            Removal::Expired => CacheEvent::Expired,
            Removal::Deleted | Removal::Evicted => CacheEvent::Evicted,
        };
        debug!(key = %entry.key, cause = ?cause, "Removed entry");
        self.notifier.publish(&entry.key, event);
    }
}
