//! Periodic background refresh of downloaded resources
//!
//! Resources are fetched lazily: a consumer calls
//! [`PeriodicResourceRefresher::ensure_fresh`] before using a file, and a
//! background download starts only if the local copy is older than the
//! resource's refresh interval and no download for it is already running.

mod fetch;
mod mock;
mod refresher;
mod registry;

pub use fetch::*;
pub use mock::*;
pub use refresher::*;
pub use registry::*;

use thiserror::Error;

/// Refresh errors
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("No resources registered")]
    EmptyRegistry,

    #[error("Resource name must be a bare file name: {0:?}")]
    InvalidName(String),

    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid locator {0:?}")]
    InvalidLocator(String),

    #[error("Unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for RefreshError {
    fn from(e: reqwest::Error) -> Self {
        RefreshError::Transport(e.to_string())
    }
}

pub type RefreshResult<T> = Result<T, RefreshError>;
