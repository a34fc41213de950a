//! Error taxonomy for the cache.
//!
//! Codec and persistence failures are absorbed inside the engine and only
//! logged; they appear here so the optional subsystems can report them with
//! `?`. Only [`CacheError::CapacityExhausted`] and [`CacheError::InvalidConfig`]
//! are ever returned to callers of [`crate::cache::engine::CacheEngine`].

use thiserror::Error;

use crate::cache::codec::CodecError;
use crate::storage::PersistenceError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Codec failure: {0}")]
    Codec(#[from] CodecError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Entry {key:?} needs {size_bytes} bytes but the byte budget is {budget_bytes}")]
    CapacityExhausted {
        key: String,
        size_bytes: usize,
        budget_bytes: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
