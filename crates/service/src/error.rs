//! Typed error enum for the service layer.
//!
//! Unifies storage, source, and configuration failures into a single error
//! type, enabling callers to match on specific failure modes instead of
//! downcasting opaque boxes.

use promptledger_core::{ConfigError, FilterError, SourceError};
use promptledger_storage::StorageError;
use thiserror::Error;

/// Service-layer error unifying the layer errors beneath it.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage operation failed (not found, conflict, database failure).
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Capture source unreadable, oversized, or undecodable.
    #[error("source: {0}")]
    Source(#[from] SourceError),

    /// Caller-supplied configuration is invalid.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Caller provided invalid input (empty content, rating out of range).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Background watch task failed to start or died unexpectedly.
    #[error("watch loop: {0}")]
    Watch(String),
}

impl ServiceError {
    /// Whether this error represents a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_not_found())
    }

    /// Whether this error represents a duplicate-fingerprint conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_conflict())
    }
}

impl From<FilterError> for ServiceError {
    fn from(err: FilterError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
