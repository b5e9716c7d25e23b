//! Error types shared across larder crates

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the shared helpers
#[derive(Debug, Error)]
pub enum LarderError {
    #[error("Not a channel name: {0:?}")]
    NotAChannel(String),

    #[error("Expected a bare file name, got {0:?}")]
    NotABareFileName(String),

    #[error("Failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LarderError>;
