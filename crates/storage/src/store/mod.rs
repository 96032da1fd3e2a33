//! SQLite store — modular structure.
//!
//! One file per entity family; shared pool plumbing and row helpers here.

mod feedback;
mod metrics;
mod prompts;
mod stats;
mod versions;

pub use stats::{LedgerStats, PromptSummary};

use std::path::Path;

use chrono::{DateTime, Utc};
use promptledger_core::{Prompt, PromptMetrics, PromptStatus};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Transaction};

use crate::error::StorageError;
use crate::migrations;

pub(crate) type PooledConn = PooledConnection<SqliteConnectionManager>;

const POOL_MAX_CONNECTIONS: u32 = 8;

/// Columns of the `prompts` table in row-mapper order.
pub(crate) const PROMPT_COLUMNS: &str = "id, content, fingerprint, category, description, model, \
     status, current_version, created_at, updated_at, quality_score, efficiency_score, \
     input_tokens, output_tokens, execution_time_ms, estimated_cost, usage_count, last_used_at";

/// Versioned prompt store over a pooled SQLite database.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: Pool<SqliteConnectionManager>,
}

impl Store {
    /// Open (or create) the database at `path` and bring the schema up to
    /// date. Parent directories are created as needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Pool(format!("failed to create database directory: {e}"))
            })?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            // WAL for concurrent readers; bounded busy wait so no write
            // blocks indefinitely on the single-writer lock.
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )
        });
        let pool = Pool::builder().max_size(POOL_MAX_CONNECTIONS).build(manager)?;

        let store = Self { pool };
        let conn = store.conn()?;
        migrations::run_migrations(&conn).map_err(|e| StorageError::Migration(e.to_string()))?;
        drop(conn);

        Ok(store)
    }

    pub(crate) fn conn(&self) -> Result<PooledConn, StorageError> {
        self.pool.get().map_err(Into::into)
    }
}

/// Decode an RFC3339 timestamp column strictly.
///
/// A bad persisted timestamp surfaces as a decode failure (and ultimately
/// `DataCorruption`) — it is never replaced with "now".
pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_status(idx: usize, raw: &str) -> rusqlite::Result<PromptStatus> {
    raw.parse::<PromptStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

/// Map a `PROMPT_COLUMNS` row into a [`Prompt`] with an empty tag list;
/// tags are batch-attached by the caller.
pub(crate) fn row_to_prompt(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prompt> {
    let status: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    let last_used_at: Option<String> = row.get(17)?;

    Ok(Prompt {
        id: row.get(0)?,
        content: row.get(1)?,
        fingerprint: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        model: row.get(5)?,
        status: parse_status(6, &status)?,
        current_version: row.get(7)?,
        created_at: parse_ts(8, &created_at)?,
        updated_at: parse_ts(9, &updated_at)?,
        tags: Vec::new(),
        metrics: PromptMetrics {
            quality_score: row.get(10)?,
            efficiency_score: row.get(11)?,
            input_tokens: row.get(12)?,
            output_tokens: row.get(13)?,
            execution_time_ms: row.get::<_, Option<i64>>(14)?.map(|v| v as u64),
            estimated_cost: row.get(15)?,
            usage_count: row.get(16)?,
            last_used_at: last_used_at.as_deref().map(|raw| parse_ts(17, raw)).transpose()?,
        },
    })
}

/// Log row read errors and filter them out of bulk reads.
pub(crate) fn log_row_error<T>(result: rusqlite::Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Row read error: {}", e);
            None
        }
    }
}

/// Escape special characters for LIKE pattern matching.
pub(crate) fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Ensure tag rows exist and link them to the prompt, inside `tx`.
pub(crate) fn attach_tags(
    tx: &Transaction<'_>,
    prompt_id: &str,
    tags: &[String],
) -> Result<(), StorageError> {
    for tag in tags {
        tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![tag])?;
        let tag_id: i64 =
            tx.query_row("SELECT id FROM tags WHERE name = ?1", params![tag], |row| row.get(0))?;
        tx.execute(
            "INSERT OR IGNORE INTO prompt_tags (prompt_id, tag_id) VALUES (?1, ?2)",
            params![prompt_id, tag_id],
        )?;
    }
    Ok(())
}

/// Fetch tags for a whole result set in one round trip and attach them.
pub(crate) fn attach_tags_batch(
    conn: &PooledConn,
    prompts: &mut [Prompt],
) -> Result<(), StorageError> {
    if prompts.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> =
        (1..=prompts.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT pt.prompt_id, t.name FROM prompt_tags pt
           JOIN tags t ON t.id = pt.tag_id
          WHERE pt.prompt_id IN ({})
          ORDER BY t.name",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let ids: Vec<&str> = prompts.iter().map(|p| p.id.as_str()).collect();
    let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut by_prompt: std::collections::HashMap<String, Vec<String>> =
        std::collections::HashMap::new();
    for row in rows.filter_map(log_row_error) {
        by_prompt.entry(row.0).or_default().push(row.1);
    }
    for prompt in prompts.iter_mut() {
        if let Some(tags) = by_prompt.remove(&prompt.id) {
            prompt.tags = tags;
        }
    }
    Ok(())
}
