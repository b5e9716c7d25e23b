//! Persistence layer for larder
//!
//! Provides:
//! - A `Store` abstraction with optional flush/close capabilities
//! - SQLite-backed key-value stores, one per channel
//! - A keyed handle cache with a single owning context
//! - Flat CSV record files keyed by (channel, id)

mod handle_cache;
mod records;
mod sqlite;
mod traits;

pub use handle_cache::*;
pub use records::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store does not support {0}")]
    Unsupported(&'static str),

    #[error("Store is closed")]
    Closed,

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Path error: {0}")]
    Path(#[from] larder_util::LarderError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<csv::Error> for StoreError {
    fn from(e: csv::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
