//! tiered-cache: tiered, priority-aware cache.
//!
//! Values live in a capacity-bounded memory tier and, when durability is
//! enabled, are mirrored to a persistent store that survives restarts:
//!   write → codec (zstd, optional) → memory tier (score-based eviction)
//!         → write-behind store (optional) → subscribers
//!
//! Entries expire by TTL, lazily on read and proactively through an
//! owner-driven sweep. When the memory tier is full, the entry with the
//! lowest score (few weighted hits, old, idle) is evicted first.

pub mod cache;
pub mod config;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod storage;

pub use cache::{
    CacheEngine, CacheError, CacheEvent, GetOptions, Lookup, PriorityClass, SetOptions,
    StatsSnapshot, Subscription,
};
pub use config::Config;
pub use scheduler::{SweepHandle, SweepScheduler};
