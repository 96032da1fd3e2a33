use promptledger_core::PromptStatus;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{log_row_error, Store};
use crate::error::StorageError;

/// Corpus-level aggregate numbers, cached by the stats service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_prompts: usize,
    pub active_prompts: usize,
    pub total_captures: u64,
    pub avg_quality: Option<f64>,
    pub avg_efficiency: Option<f64>,
    /// Most frequent categories, descending, top 5.
    pub top_categories: Vec<(String, usize)>,
    /// Most frequent tags, descending, top 10.
    pub top_tags: Vec<(String, usize)>,
}

/// Compact row for top/bottom performer listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSummary {
    pub id: String,
    pub excerpt: String,
    pub category: Option<String>,
    pub quality_score: Option<f64>,
    pub efficiency_score: Option<f64>,
    pub usage_count: u32,
}

const EXCERPT_CHARS: usize = 80;

impl Store {
    /// Aggregate numbers for the whole ledger, in a bounded number of
    /// queries.
    pub fn aggregate_stats(&self) -> Result<LedgerStats, StorageError> {
        let conn = self.conn()?;

        let (total_prompts, active_prompts, total_captures, avg_quality, avg_efficiency): (
            i64,
            i64,
            i64,
            Option<f64>,
            Option<f64>,
        ) = conn.query_row(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE status = ?1),
                    COALESCE(SUM(usage_count), 0),
                    AVG(quality_score),
                    AVG(efficiency_score)
               FROM prompts",
            params![PromptStatus::Active.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) AS uses FROM prompts
              WHERE category IS NOT NULL
              GROUP BY category ORDER BY uses DESC, category ASC LIMIT 5",
        )?;
        let top_categories: Vec<(String, usize)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
            .filter_map(log_row_error)
            .collect();
        drop(stmt);

        let mut stmt = conn.prepare(
            "SELECT t.name, COUNT(*) AS uses FROM prompt_tags pt
               JOIN tags t ON t.id = pt.tag_id
              GROUP BY t.name ORDER BY uses DESC, t.name ASC LIMIT 10",
        )?;
        let top_tags: Vec<(String, usize)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
            .filter_map(log_row_error)
            .collect();

        Ok(LedgerStats {
            total_prompts: total_prompts as usize,
            active_prompts: active_prompts as usize,
            total_captures: total_captures as u64,
            avg_quality,
            avg_efficiency,
            top_categories,
            top_tags,
        })
    }

    /// Highest-quality prompts, descending; unscored prompts sort last and
    /// are excluded.
    pub fn top_performers(&self, limit: usize) -> Result<Vec<PromptSummary>, StorageError> {
        self.performers(limit, "DESC")
    }

    /// Lowest-quality scored prompts, ascending.
    pub fn bottom_performers(&self, limit: usize) -> Result<Vec<PromptSummary>, StorageError> {
        self.performers(limit, "ASC")
    }

    fn performers(&self, limit: usize, direction: &str) -> Result<Vec<PromptSummary>, StorageError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT id, content, category, quality_score, efficiency_score, usage_count
               FROM prompts WHERE quality_score IS NOT NULL
              ORDER BY quality_score {direction}, id ASC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let summaries = stmt
            .query_map(params![limit], |row| {
                let content: String = row.get(1)?;
                Ok(PromptSummary {
                    id: row.get(0)?,
                    excerpt: content.chars().take(EXCERPT_CHARS).collect(),
                    category: row.get(2)?,
                    quality_score: row.get(3)?,
                    efficiency_score: row.get(4)?,
                    usage_count: row.get(5)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(summaries)
    }
}
