//! Error types for place recognition

use thiserror::Error;

/// Errors that can occur while recognizing places
#[derive(Debug, Error)]
pub enum PlaceError {
    #[error("Not enough data for place clustering: {samples} sample(s) after downsampling")]
    InsufficientData { samples: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by a [`PlaceStore`](crate::store::PlaceStore) implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PlaceError>;
