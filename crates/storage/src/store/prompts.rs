use chrono::Utc;
use promptledger_core::{Prompt, PromptFilter, PromptPatch, PromptStatus};
use rusqlite::{params, OptionalExtension};

use super::{
    attach_tags, attach_tags_batch, escape_like_pattern, log_row_error, row_to_prompt, Store,
    PROMPT_COLUMNS,
};
use crate::error::StorageError;

impl Store {
    /// Persist a new prompt: row, version 1, tag links, and the initial
    /// metrics-history entry, atomically.
    ///
    /// # Errors
    /// `Conflict` if the fingerprint is already stored.
    pub fn create(&self, prompt: &Prompt) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM prompts WHERE fingerprint = ?1",
                params![prompt.fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Err(StorageError::Conflict(format!(
                "fingerprint {} already stored as prompt {}",
                prompt.fingerprint, id
            )));
        }

        tx.execute(
            "INSERT INTO prompts
               (id, content, fingerprint, category, description, model, status,
                current_version, created_at, updated_at, quality_score, efficiency_score,
                input_tokens, output_tokens, execution_time_ms, estimated_cost,
                usage_count, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                prompt.id,
                prompt.content,
                prompt.fingerprint,
                prompt.category,
                prompt.description,
                prompt.model,
                prompt.status.as_str(),
                prompt.current_version,
                prompt.created_at.to_rfc3339(),
                prompt.updated_at.to_rfc3339(),
                prompt.metrics.quality_score,
                prompt.metrics.efficiency_score,
                prompt.metrics.input_tokens,
                prompt.metrics.output_tokens,
                prompt.metrics.execution_time_ms.map(|v| v as i64),
                prompt.metrics.estimated_cost,
                prompt.metrics.usage_count,
                prompt.metrics.last_used_at.map(|ts| ts.to_rfc3339()),
            ],
        )?;

        tx.execute(
            "INSERT INTO prompt_versions (prompt_id, version_number, content, fingerprint, created_at)
             VALUES (?1, 1, ?2, ?3, ?4)",
            params![prompt.id, prompt.content, prompt.fingerprint, prompt.created_at.to_rfc3339()],
        )?;

        attach_tags(&tx, &prompt.id, &prompt.tags)?;

        tx.execute(
            "INSERT INTO metrics_history (prompt_id, recorded_at, quality, efficiency, total_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                prompt.id,
                prompt.created_at.to_rfc3339(),
                prompt.metrics.quality_score,
                prompt.metrics.efficiency_score,
                prompt.metrics.total_tokens(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Current-version view of a prompt, tags attached.
    pub fn get(&self, id: &str) -> Result<Prompt, StorageError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE id = ?1");
        let prompt = conn
            .query_row(&sql, params![id], row_to_prompt)
            .optional()?
            .ok_or_else(|| StorageError::not_found("prompt", id))?;

        let mut prompts = [prompt];
        attach_tags_batch(&conn, &mut prompts)?;
        let [prompt] = prompts;
        Ok(prompt)
    }

    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Prompt, StorageError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE fingerprint = ?1");
        let prompt = conn
            .query_row(&sql, params![fingerprint], row_to_prompt)
            .optional()?
            .ok_or_else(|| StorageError::not_found("fingerprint", fingerprint))?;

        let mut prompts = [prompt];
        attach_tags_batch(&conn, &mut prompts)?;
        let [prompt] = prompts;
        Ok(prompt)
    }

    /// Bump usage on an exact-duplicate capture.
    pub fn record_usage(&self, id: &str) -> Result<Prompt, StorageError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE prompts SET usage_count = usage_count + 1, last_used_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("prompt", id));
        }
        drop(conn);
        self.get(id)
    }

    /// List prompts matching `filter`, tags and embedded metrics attached.
    ///
    /// Exactly two round trips regardless of result size: one for the rows,
    /// one batched query for all tags.
    pub fn list(&self, filter: &PromptFilter) -> Result<Vec<Prompt>, StorageError> {
        let conn = self.conn()?;

        let mut sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts p");
        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref category) = filter.category {
            args.push(Box::new(category.clone()));
            conditions.push(format!("p.category = ?{}", args.len()));
        }
        if let Some(status) = filter.status {
            args.push(Box::new(status.as_str()));
            conditions.push(format!("p.status = ?{}", args.len()));
        }
        if !filter.tags.is_empty() {
            let mut placeholders = Vec::new();
            for tag in &filter.tags {
                args.push(Box::new(tag.clone()));
                placeholders.push(format!("?{}", args.len()));
            }
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM prompt_tags pt JOIN tags t ON t.id = pt.tag_id
                          WHERE pt.prompt_id = p.id AND t.name IN ({}))",
                placeholders.join(", ")
            ));
        }
        if let Some(min) = filter.min_quality {
            args.push(Box::new(min));
            conditions.push(format!("p.quality_score >= ?{}", args.len()));
        }
        if let Some(max) = filter.max_quality {
            args.push(Box::new(max));
            conditions.push(format!("p.quality_score <= ?{}", args.len()));
        }
        if let Some(min) = filter.min_efficiency {
            args.push(Box::new(min));
            conditions.push(format!("p.efficiency_score >= ?{}", args.len()));
        }
        if let Some(max) = filter.max_efficiency {
            args.push(Box::new(max));
            conditions.push(format!("p.efficiency_score <= ?{}", args.len()));
        }
        if let Some(after) = filter.created_after {
            args.push(Box::new(after.to_rfc3339()));
            conditions.push(format!("p.created_at >= ?{}", args.len()));
        }
        if let Some(before) = filter.created_before {
            args.push(Box::new(before.to_rfc3339()));
            conditions.push(format!("p.created_at <= ?{}", args.len()));
        }
        if let Some(ref search) = filter.search {
            args.push(Box::new(format!("%{}%", escape_like_pattern(search))));
            conditions.push(format!("p.content LIKE ?{} ESCAPE '\\'", args.len()));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY p.created_at DESC");
        sql.push_str(&format!(" LIMIT {}", filter.effective_limit()));
        if let Some(offset) = filter.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let mut prompts: Vec<Prompt> = stmt
            .query_map(arg_refs.as_slice(), row_to_prompt)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        attach_tags_batch(&conn, &mut prompts)?;
        Ok(prompts)
    }

    /// Full-text content search, bm25-ranked.
    pub fn search_content(&self, query: &str, limit: usize) -> Result<Vec<Prompt>, StorageError> {
        let fts_query = query
            .split_whitespace()
            .map(|word| format!("\"{}\"*", word.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" AND ");
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let sql = format!(
            "SELECT {PROMPT_COLUMNS} FROM prompts
              JOIN (SELECT rowid, bm25(prompts_fts) AS fts_rank FROM prompts_fts
                     WHERE prompts_fts MATCH ?1
                     ORDER BY fts_rank LIMIT ?2) AS hits
                ON prompts.rowid = hits.rowid
             ORDER BY hits.fts_rank"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut prompts: Vec<Prompt> = stmt
            .query_map(params![fts_query, limit], row_to_prompt)?
            .filter_map(log_row_error)
            .collect();
        drop(stmt);

        attach_tags_batch(&conn, &mut prompts)?;
        Ok(prompts)
    }

    /// Apply a status transition after checking the lifecycle machine.
    pub fn set_status(&self, id: &str, to: PromptStatus) -> Result<Prompt, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let raw: Option<String> = tx
            .query_row("SELECT status FROM prompts WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        let raw = raw.ok_or_else(|| StorageError::not_found("prompt", id))?;
        let from: PromptStatus = raw
            .parse()
            .map_err(|e: String| StorageError::corrupt(format!("prompt {id} status"), StatusParseError(e)))?;

        if !from.can_transition(to) {
            return Err(StorageError::InvalidTransition { from, to });
        }

        tx.execute(
            "UPDATE prompts SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, to.as_str(), Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        drop(conn);
        self.get(id)
    }

    /// Status transition only; content and history stay untouched.
    pub fn archive(&self, id: &str) -> Result<Prompt, StorageError> {
        self.set_status(id, PromptStatus::Archived)
    }

    pub fn restore(&self, id: &str) -> Result<Prompt, StorageError> {
        self.set_status(id, PromptStatus::Active)
    }

    /// Update metadata and the embedded resource numbers without creating a
    /// new version.
    pub fn update_metadata(&self, id: &str, patch: &PromptPatch) -> Result<Prompt, StorageError> {
        if patch.is_empty() {
            return self.get(id);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut sets: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(id.to_string())];
        fn push(
            sets: &mut Vec<String>,
            args: &mut Vec<Box<dyn rusqlite::ToSql>>,
            column: &str,
            value: Box<dyn rusqlite::ToSql>,
        ) {
            args.push(value);
            sets.push(format!("{column} = ?{}", args.len()));
        }

        if let Some(ref category) = patch.category {
            push(&mut sets, &mut args, "category", Box::new(category.clone()));
        }
        if let Some(ref description) = patch.description {
            push(&mut sets, &mut args, "description", Box::new(description.clone()));
        }
        if let Some(ref model) = patch.model {
            push(&mut sets, &mut args, "model", Box::new(model.clone()));
        }
        if let Some(tokens) = patch.input_tokens {
            push(&mut sets, &mut args, "input_tokens", Box::new(tokens));
        }
        if let Some(tokens) = patch.output_tokens {
            push(&mut sets, &mut args, "output_tokens", Box::new(tokens));
        }
        if let Some(ms) = patch.execution_time_ms {
            push(&mut sets, &mut args, "execution_time_ms", Box::new(ms as i64));
        }
        if let Some(cost) = patch.estimated_cost {
            push(&mut sets, &mut args, "estimated_cost", Box::new(cost));
        }
        push(&mut sets, &mut args, "updated_at", Box::new(Utc::now().to_rfc3339()));

        let sql = format!("UPDATE prompts SET {} WHERE id = ?1", sets.join(", "));
        let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let changed = tx.execute(&sql, arg_refs.as_slice())?;
        if changed == 0 {
            return Err(StorageError::not_found("prompt", id));
        }

        if let Some(ref tags) = patch.tags {
            tx.execute("DELETE FROM prompt_tags WHERE prompt_id = ?1", params![id])?;
            attach_tags(&tx, id, tags)?;
        }

        tx.commit()?;
        drop(conn);
        self.get(id)
    }

    /// Remove a prompt and its versions, feedback, and history. Tag rows
    /// referenced by other prompts are untouched.
    pub fn delete(&self, id: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM prompts WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::not_found("prompt", id));
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM prompts", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Wrapper so a plain status-parse message can travel as an error source.
#[derive(Debug)]
struct StatusParseError(String);

impl std::fmt::Display for StatusParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StatusParseError {}
