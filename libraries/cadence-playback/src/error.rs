//! Error types for the playback engine

use std::time::Duration;
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The event loop is gone (engine shut down or its thread exited)
    #[error("Playback engine is not running")]
    EngineStopped,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`SourceOpener`](crate::SourceOpener)
#[derive(Debug, Error)]
pub enum OpenError {
    /// Nothing exists at the URI
    #[error("Source not found: {0}")]
    NotFound(String),

    /// The source exists but cannot be decoded
    #[error("Unsupported source: {0}")]
    Unsupported(String),

    /// Open did not complete in time
    #[error("Timed out after {0:?} opening source")]
    TimedOut(Duration),

    /// IO error while reading the source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other platform failure
    #[error("{0}")]
    Other(String),
}

/// Errors from a [`KeyValueStore`](crate::KeyValueStore) commit
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
