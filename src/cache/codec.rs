//! Value compression.
//!
//! Values are encoded as compact JSON and compressed with zstd. When
//! compression is disabled, or encoding fails, values are stored raw and the
//! [`StoredValue`] variant records that so decoding is skipped on read.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::CompressionConfig;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Zstd failure: {0}")]
    ZstdError(#[from] std::io::Error),

    #[error("JSON failure: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A value as held by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum StoredValue {
    /// Uncompressed payload.
    Raw(Value),
    /// zstd-compressed JSON.
    Zstd(Bytes),
}

impl StoredValue {
    pub fn is_compressed(&self) -> bool {
        matches!(self, StoredValue::Zstd(_))
    }
}

/// The compression engine.
#[derive(Debug, Clone)]
pub struct Codec {
    config: CompressionConfig,
}

impl Codec {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// JSON-encode and compress a value.
    pub fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        let json = serde_json::to_vec(value)?;
        let compressed = zstd::encode_all(json.as_slice(), self.config.zstd_level)?;
        Ok(Bytes::from(compressed))
    }

    /// Decompress and JSON-decode a value.
    pub fn decode(&self, data: &[u8]) -> Result<Value, CodecError> {
        let json = zstd::decode_all(data)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Prepare a value for storage, falling back to the raw value on failure.
    ///
    /// `compress` overrides the configured default for this value only.
    pub fn pack(&self, value: Value, compress: Option<bool>) -> StoredValue {
        if !compress.unwrap_or(self.config.enabled) {
            return StoredValue::Raw(value);
        }
        match self.encode(&value) {
            Ok(bytes) => StoredValue::Zstd(bytes),
            Err(e) => {
                warn!(error = %e, "Compression failed, storing raw value");
                StoredValue::Raw(value)
            }
        }
    }

    /// Recover the caller's value. Raw values pass through untouched, whatever
    /// the current compression setting.
    pub fn unpack(&self, stored: &StoredValue) -> Result<Value, CodecError> {
        match stored {
            StoredValue::Raw(value) => Ok(value.clone()),
            StoredValue::Zstd(bytes) => self.decode(bytes),
        }
    }
}
