//! Storage layer for promptledger
//!
//! SQLite-based versioned store with FTS5 for full-text search. Writes
//! serialize through SQLite's single-writer lock with a bounded busy
//! timeout; readers run concurrently under WAL.

mod error;
mod migrations;
mod store;

pub use error::StorageError;
pub use migrations::SCHEMA_VERSION;
pub use store::{LedgerStats, PromptSummary, Store};
