use chrono::Utc;
use promptledger_core::Feedback;
use rusqlite::{params, OptionalExtension};

use super::{log_row_error, parse_ts, Store};
use crate::error::StorageError;

impl Store {
    /// Append one feedback record. Feedback is never edited in place; a
    /// correction is a new record.
    pub fn attach_feedback(
        &self,
        prompt_id: &str,
        rating: u8,
        note: Option<&str>,
    ) -> Result<Feedback, StorageError> {
        let conn = self.conn()?;

        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM prompts WHERE id = ?1", params![prompt_id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StorageError::not_found("prompt", prompt_id));
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO feedback (prompt_id, rating, note, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![prompt_id, rating, note, now.to_rfc3339()],
        )?;

        Ok(Feedback {
            id: conn.last_insert_rowid(),
            prompt_id: prompt_id.to_string(),
            rating,
            note: note.map(str::to_string),
            created_at: now,
        })
    }

    /// All feedback for a prompt, oldest first.
    pub fn feedback_for(&self, prompt_id: &str) -> Result<Vec<Feedback>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, prompt_id, rating, note, created_at
               FROM feedback WHERE prompt_id = ?1
              ORDER BY created_at ASC, id ASC",
        )?;
        let feedback = stmt
            .query_map(params![prompt_id], |row| {
                let created_at: String = row.get(4)?;
                Ok(Feedback {
                    id: row.get(0)?,
                    prompt_id: row.get(1)?,
                    rating: row.get(2)?,
                    note: row.get(3)?,
                    created_at: parse_ts(4, &created_at)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(feedback)
    }

    /// Mean feedback rating for a prompt, if it has any feedback.
    pub fn average_rating(&self, prompt_id: &str) -> Result<Option<f64>, StorageError> {
        let conn = self.conn()?;
        let avg: Option<f64> = conn.query_row(
            "SELECT AVG(rating) FROM feedback WHERE prompt_id = ?1",
            params![prompt_id],
            |row| row.get(0),
        )?;
        Ok(avg)
    }
}
