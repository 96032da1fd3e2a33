//! Typed error enum for the storage layer.
//!
//! Every storage operation returns `Result<_, StorageError>` so callers can
//! match on specific failure modes (not found, duplicate fingerprint, illegal
//! status transition) instead of downcasting opaque boxes.

use promptledger_core::PromptStatus;
use thiserror::Error;

/// Storage-layer error with variants covering every expected failure mode.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Row not found for expected-present entity.
    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violation (duplicate fingerprint on create).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Status change the lifecycle machine does not permit.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: PromptStatus, to: PromptStatus },

    /// SQL / connection failure.
    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// Connection pool exhausted or unavailable.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Persisted row could not be decoded into its domain type. Reported to
    /// the caller, never papered over with a default value.
    #[error("data corruption: {context}")]
    DataCorruption {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Migration failure.
    #[error("migration error: {0}")]
    Migration(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn corrupt(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DataCorruption { context: context.into(), source: Box::new(source) }
    }

    /// Whether this error represents a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error is a duplicate-fingerprint conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Custom `From<rusqlite::Error>` — NOT a blanket `#[from]`.
///
/// - no rows → `NotFound` (generic; callers remap with entity context)
/// - constraint violation → `Conflict`
/// - column decode failures → `DataCorruption`
/// - everything else → `Database`
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::Error as E;
        match err {
            E::QueryReturnedNoRows => Self::not_found("row", "unknown"),
            E::SqliteFailure(ref code, ref message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(
                    message.clone().unwrap_or_else(|| "constraint violation".to_string()),
                )
            }
            E::FromSqlConversionFailure(..)
            | E::IntegralValueOutOfRange(..)
            | E::InvalidColumnType(..) => Self::DataCorruption {
                context: "row decode failed".to_string(),
                source: Box::new(err),
            },
            _ => Self::Database(err),
        }
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        Self::Pool(err.to_string())
    }
}
