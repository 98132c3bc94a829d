//! Error types for live collection sync.

use crate::types::ItemId;
use thiserror::Error;

/// Main error type for sync operations.
///
/// Cloneable so the reconciler can keep the last error in its state and hand
/// it out with every snapshot.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Invalid change payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Live collection is closed")]
    Closed,
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
