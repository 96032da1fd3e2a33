use chrono::Utc;
use promptledger_core::{Prompt, PromptVersion};
use rusqlite::{params, OptionalExtension};

use super::{log_row_error, parse_ts, Store};
use crate::error::StorageError;

impl Store {
    /// All versions of a prompt, oldest first. Version numbers are
    /// contiguous starting at 1.
    pub fn history(&self, id: &str) -> Result<Vec<PromptVersion>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT prompt_id, version_number, content, fingerprint, created_at
               FROM prompt_versions WHERE prompt_id = ?1
              ORDER BY version_number ASC",
        )?;
        let versions: Vec<PromptVersion> = stmt
            .query_map(params![id], |row| {
                let created_at: String = row.get(4)?;
                Ok(PromptVersion {
                    prompt_id: row.get(0)?,
                    version_number: row.get(1)?,
                    content: row.get(2)?,
                    fingerprint: row.get(3)?,
                    created_at: parse_ts(4, &created_at)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        drop(stmt);

        if versions.is_empty() {
            // Every stored prompt has at least version 1.
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM prompts WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(StorageError::not_found("prompt", id));
            }
        }
        Ok(versions)
    }

    /// Append a new version with `content` and advance the current pointer.
    pub fn update_content(
        &self,
        id: &str,
        content: &str,
        fingerprint: &str,
    ) -> Result<Prompt, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT current_version FROM prompts WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.ok_or_else(|| StorageError::not_found("prompt", id))?;

        let holder: Option<String> = tx
            .query_row(
                "SELECT id FROM prompts WHERE fingerprint = ?1 AND id != ?2",
                params![fingerprint, id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(other) = holder {
            return Err(StorageError::Conflict(format!(
                "fingerprint {fingerprint} already stored as prompt {other}"
            )));
        }

        let next = current + 1;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO prompt_versions (prompt_id, version_number, content, fingerprint, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, next, content, fingerprint, now],
        )?;
        tx.execute(
            "UPDATE prompts SET content = ?2, fingerprint = ?3, current_version = ?4, updated_at = ?5
              WHERE id = ?1",
            params![id, content, fingerprint, next, now],
        )?;

        tx.commit()?;
        drop(conn);
        self.get(id)
    }

    /// Create a new version whose content equals the target historical
    /// version's content. Existing version rows are never touched.
    pub fn revert(&self, id: &str, version_number: i64) -> Result<Prompt, StorageError> {
        let conn = self.conn()?;
        let target: Option<(String, String)> = conn
            .query_row(
                "SELECT content, fingerprint FROM prompt_versions
                  WHERE prompt_id = ?1 AND version_number = ?2",
                params![id, version_number],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        drop(conn);

        let Some((content, fingerprint)) = target else {
            // Distinguish unknown prompt from unknown version.
            self.get(id)?;
            return Err(StorageError::not_found("version", format!("{id}@{version_number}")));
        };

        self.update_content(id, &content, &fingerprint)
    }
}
