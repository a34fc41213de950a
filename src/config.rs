//! Runtime configuration for tiered-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All cache knobs (capacity, TTL, sweep cadence, durability, compression) live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::error::CacheError;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiered-cache", about = "Tiered, priority-aware cache server")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Memory tier and expiry settings.
    pub cache: CacheConfig,

    /// Durable tier settings.
    pub persistence: PersistenceConfig,

    /// Compression settings.
    pub compression: CompressionConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Memory tier capacity and expiry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of live entries.
    pub max_entries: usize,

    /// Optional budget for the summed `size_bytes` of live entries.
    pub max_bytes: Option<usize>,

    /// TTL applied when a write does not carry its own.
    pub default_ttl_secs: u64,

    /// Interval between background sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_bytes: None,
            default_ttl_secs: 300, // 5 minutes
            sweep_interval_secs: 60,
        }
    }
}

/// Durable tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Mirror every write/delete into the persistent store.
    pub durable: bool,

    /// Directory holding the namespaced blob.
    pub dir: PathBuf,

    /// Blob name; the store file is `<dir>/<namespace>.json`.
    pub namespace: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            durable: false,
            dir: PathBuf::from("/tmp/tiered-cache"),
            namespace: "cache-store".to_string(),
        }
    }
}

/// Value compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Store values zstd-compressed.
    pub enabled: bool,

    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            zstd_level: 3,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), CacheError> {
        let invalid = |msg: &str| Err(CacheError::InvalidConfig(msg.to_string()));

        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries must be at least 1");
        }
        if self.cache.max_bytes == Some(0) {
            return invalid("cache.max_bytes must be positive when set");
        }
        if self.cache.default_ttl_secs == 0 {
            return invalid("cache.default_ttl_secs must be positive");
        }
        if self.cache.sweep_interval_secs == 0 {
            return invalid("cache.sweep_interval_secs must be positive");
        }
        if !(1..=22).contains(&self.compression.zstd_level) {
            return invalid("compression.zstd_level must be within 1..=22");
        }
        if self.persistence.durable && self.persistence.namespace.trim().is_empty() {
            return invalid("persistence.namespace must not be empty");
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }

    /// Path of the durable blob.
    pub fn store_path(&self) -> PathBuf {
        self.persistence
            .dir
            .join(format!("{}.json", self.persistence.namespace))
    }
}
