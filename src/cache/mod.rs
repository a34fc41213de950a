//! Tiered cache management.
//!
//! This module contains the core cache data structures and algorithms:
//! - [`entry`]: CacheEntry, PriorityClass
//! - [`clock`]: Time source for timestamps and expiry
//! - [`size`]: Value size estimation
//! - [`codec`]: zstd compression/decompression of values
//! - [`eviction`]: Scoring and the indexed min-heap that picks victims
//! - [`memory`]: Capacity-bounded memory tier
//! - [`notifier`]: Per-key subscriptions
//! - [`engine`]: Public get/set/delete/sweep orchestration

pub mod clock;
pub mod codec;
pub mod engine;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod memory;
pub mod notifier;
pub mod size;

pub use engine::{CacheEngine, GetOptions, Lookup, SetOptions, StatsSnapshot};
pub use entry::PriorityClass;
pub use error::CacheError;
pub use notifier::{CacheEvent, Subscription};
