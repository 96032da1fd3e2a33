use chrono::{DateTime, Utc};
use promptledger_core::{MetricsPoint, ResourceSample};
use rusqlite::{params, OptionalExtension};

use super::{log_row_error, parse_ts, Store};
use crate::error::StorageError;

impl Store {
    /// Write analyzer scores: update the embedded snapshot and append a
    /// metrics-history row, in one transaction.
    ///
    /// `None` leaves the corresponding snapshot column as it was; the history
    /// row always records the effective values after the update.
    pub fn save_scores(
        &self,
        prompt_id: &str,
        quality: Option<f64>,
        efficiency: Option<f64>,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE prompts SET
                quality_score = COALESCE(?2, quality_score),
                efficiency_score = COALESCE(?3, efficiency_score),
                updated_at = ?4
              WHERE id = ?1",
            params![prompt_id, quality, efficiency, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("prompt", prompt_id));
        }

        let (effective_quality, effective_efficiency, input_tokens, output_tokens): (
            Option<f64>,
            Option<f64>,
            Option<u32>,
            Option<u32>,
        ) = tx.query_row(
            "SELECT quality_score, efficiency_score, input_tokens, output_tokens
               FROM prompts WHERE id = ?1",
            params![prompt_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let total_tokens = match (input_tokens, output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
        };

        tx.execute(
            "INSERT INTO metrics_history (prompt_id, recorded_at, quality, efficiency, total_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                prompt_id,
                Utc::now().to_rfc3339(),
                effective_quality,
                effective_efficiency,
                total_tokens,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Metrics-history rows for one prompt, oldest first.
    pub fn metrics_history(
        &self,
        prompt_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricsPoint>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT prompt_id, recorded_at, quality, efficiency, total_tokens
               FROM metrics_history
              WHERE prompt_id = ?1 AND (?2 IS NULL OR recorded_at >= ?2)
              ORDER BY recorded_at ASC, id ASC",
        )?;
        let points: Vec<MetricsPoint> = stmt
            .query_map(params![prompt_id, since.map(|ts| ts.to_rfc3339())], map_point)?
            .filter_map(log_row_error)
            .collect();
        drop(stmt);

        if points.is_empty() {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM prompts WHERE id = ?1", params![prompt_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(StorageError::not_found("prompt", prompt_id));
            }
        }
        Ok(points)
    }

    /// Metrics-history rows across the whole corpus, oldest first.
    pub fn metrics_history_all(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricsPoint>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT prompt_id, recorded_at, quality, efficiency, total_tokens
               FROM metrics_history
              WHERE ?1 IS NULL OR recorded_at >= ?1
              ORDER BY recorded_at ASC, id ASC",
        )?;
        let points = stmt
            .query_map(params![since.map(|ts| ts.to_rfc3339())], map_point)?
            .filter_map(log_row_error)
            .collect();
        Ok(points)
    }

    /// Resource numbers of the most recently touched prompts, used as the
    /// percentile reference window for efficiency scoring.
    pub fn reference_window(&self, limit: usize) -> Result<Vec<ResourceSample>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT input_tokens, output_tokens, execution_time_ms, estimated_cost
               FROM prompts ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let samples = stmt
            .query_map(params![limit], |row| {
                let input: Option<u32> = row.get(0)?;
                let output: Option<u32> = row.get(1)?;
                let total_tokens = match (input, output) {
                    (None, None) => None,
                    (i, o) => Some(i.unwrap_or(0) + o.unwrap_or(0)),
                };
                Ok(ResourceSample {
                    total_tokens,
                    execution_time_ms: row.get::<_, Option<i64>>(2)?.map(|v| v as u64),
                    estimated_cost: row.get(3)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(samples)
    }
}

fn map_point(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricsPoint> {
    let recorded_at: String = row.get(1)?;
    Ok(MetricsPoint {
        prompt_id: row.get(0)?,
        recorded_at: parse_ts(1, &recorded_at)?,
        quality: row.get(2)?,
        efficiency: row.get(3)?,
        total_tokens: row.get(4)?,
    })
}
