//! Capture pipeline and the prompt write path.
//!
//! One submitted artifact flows normalize → fingerprint → exact-duplicate
//! check → bounded near-duplicate probe → atomic persist. Near-duplicates are
//! advisory: nothing is persisted and the caller decides merge vs keep.

mod enrich;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use promptledger_core::{
    fingerprint, normalize, read_source, LedgerConfig, Prompt, PromptDraft, PromptFilter,
    PromptPatch, SimilarityIndex, MAX_RATING, MIN_RATING,
};
use promptledger_storage::Store;

use crate::error::ServiceError;
use crate::scoring_service::ScoringEngine;
use crate::stats_service::StatsService;

/// What the caller submitted for capture.
#[derive(Debug, Clone)]
pub enum CaptureSource {
    File(PathBuf),
    Inline(String),
}

/// Caller-supplied metadata. Hints always win over lexical detection, in
/// manual and watch captures alike.
#[derive(Debug, Clone, Default)]
pub struct CaptureHints {
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub model: Option<String>,
    pub description: Option<String>,
}

/// Result of one capture attempt.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// New prompt persisted (version 1).
    Created(Prompt),
    /// Byte-identical normalized content already stored; usage was bumped
    /// on the returned prompt instead of creating a row.
    Duplicate(Prompt),
    /// Content close to an existing prompt; nothing persisted, the caller
    /// decides merge vs keep-separate.
    NearDuplicate { candidate_id: String, similarity: f64 },
}

/// Capture pipeline plus the rest of the prompt write path (update, revert,
/// delete, feedback), keeping the similarity index and stats caches in step
/// with every write.
pub struct CaptureService {
    store: Store,
    index: Mutex<SimilarityIndex>,
    similarity_threshold: f64,
    max_source_bytes: u64,
    auto_analyze: bool,
    scoring: Arc<ScoringEngine>,
    stats: Arc<StatsService>,
}

impl CaptureService {
    /// Validate the configuration and rebuild the similarity index from the
    /// store.
    pub fn new(
        store: Store,
        config: &LedgerConfig,
        scoring: Arc<ScoringEngine>,
        stats: Arc<StatsService>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;

        let mut index = SimilarityIndex::new();
        let mut filter = PromptFilter::default();
        let page = filter.effective_limit();
        let mut offset = 0usize;
        loop {
            filter.offset = Some(offset);
            let prompts = store.list(&filter)?;
            let fetched = prompts.len();
            for prompt in &prompts {
                index.insert(prompt.id.clone(), &prompt.content);
            }
            if fetched < page {
                break;
            }
            offset += fetched;
        }
        tracing::debug!(indexed = index.len(), "similarity index rebuilt");

        Ok(Self {
            store,
            index: Mutex::new(index),
            similarity_threshold: config.similarity_threshold,
            max_source_bytes: config.max_source_bytes,
            auto_analyze: config.auto_analyze,
            scoring,
            stats,
        })
    }

    /// Capture one artifact.
    pub fn capture(
        &self,
        source: CaptureSource,
        hints: CaptureHints,
    ) -> Result<CaptureOutcome, ServiceError> {
        let raw = match source {
            CaptureSource::File(path) => read_source(&path, self.max_source_bytes)?,
            CaptureSource::Inline(text) => text,
        };
        let content = normalize(&raw);
        if content.is_empty() {
            return Err(ServiceError::InvalidInput("capture content is empty".to_string()));
        }
        let digest = fingerprint(&content);

        // Exact duplicate: same normalized content, same fingerprint.
        match self.store.get_by_fingerprint(&digest) {
            Ok(existing) => {
                let bumped = self.store.record_usage(&existing.id)?;
                self.stats.invalidate_aggregates();
                tracing::debug!(
                    prompt_id = %bumped.id,
                    usage_count = bumped.metrics.usage_count,
                    "capture matched existing fingerprint"
                );
                return Ok(CaptureOutcome::Duplicate(bumped));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        // Near duplicate: bounded candidate set, exact comparison on the
        // survivors only.
        if let Some(hit) = self.lock_index().best_match(&content) {
            if hit.score >= self.similarity_threshold {
                tracing::info!(
                    candidate = %hit.id,
                    similarity = hit.score,
                    "near-duplicate capture withheld"
                );
                return Ok(CaptureOutcome::NearDuplicate {
                    candidate_id: hit.id,
                    similarity: hit.score,
                });
            }
        }

        let prompt = self.build_prompt(content, &hints);
        self.store.create(&prompt)?;
        self.lock_index().insert(prompt.id.clone(), &prompt.content);

        if self.auto_analyze {
            if let Err(e) = self.scoring.analyze(&prompt.id, None) {
                tracing::warn!(prompt_id = %prompt.id, error = %e, "auto-analysis failed after capture");
            }
        }
        self.stats.invalidate_aggregates();

        // Reload so the returned snapshot carries any auto-analysis scores.
        let stored = self.store.get(&prompt.id)?;
        tracing::info!(prompt_id = %stored.id, "captured new prompt");
        Ok(CaptureOutcome::Created(stored))
    }

    /// Append a new content version, refresh the index, and invalidate
    /// aggregates.
    pub fn update_content(&self, id: &str, new_content: &str) -> Result<Prompt, ServiceError> {
        let content = normalize(new_content);
        if content.is_empty() {
            return Err(ServiceError::InvalidInput("updated content is empty".to_string()));
        }
        let digest = fingerprint(&content);

        let updated = self.store.update_content(id, &content, &digest)?;
        self.lock_index().insert(updated.id.clone(), &updated.content);

        if self.auto_analyze {
            if let Err(e) = self.scoring.analyze(id, None) {
                tracing::warn!(prompt_id = %id, error = %e, "auto-analysis failed after update");
            }
        }
        self.stats.invalidate_aggregates();
        Ok(self.store.get(id)?)
    }

    /// Metadata-only update; no new version.
    pub fn update_metadata(&self, id: &str, patch: &PromptPatch) -> Result<Prompt, ServiceError> {
        let updated = self.store.update_metadata(id, patch)?;
        self.stats.invalidate_aggregates();
        Ok(updated)
    }

    /// Roll the current pointer forward to a copy of a historical version.
    pub fn revert(&self, id: &str, version_number: i64) -> Result<Prompt, ServiceError> {
        let reverted = self.store.revert(id, version_number)?;
        self.lock_index().insert(reverted.id.clone(), &reverted.content);
        self.stats.invalidate_aggregates();
        Ok(reverted)
    }

    /// Remove a prompt everywhere: store, similarity index, cached
    /// aggregates.
    pub fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.store.delete(id)?;
        self.lock_index().remove(id);
        self.stats.invalidate_aggregates();
        Ok(())
    }

    /// Validate and append one feedback record.
    pub fn attach_feedback(
        &self,
        id: &str,
        rating: u8,
        note: Option<&str>,
    ) -> Result<promptledger_core::Feedback, ServiceError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(ServiceError::InvalidInput(format!(
                "rating {rating} outside {MIN_RATING}..={MAX_RATING}"
            )));
        }
        let feedback = self.store.attach_feedback(id, rating, note)?;
        self.stats.invalidate_aggregates();
        Ok(feedback)
    }

    fn build_prompt(&self, content: String, hints: &CaptureHints) -> Prompt {
        let category =
            hints.category.clone().or_else(|| enrich::detect_category(&content));
        let model = hints.model.clone().or_else(|| enrich::detect_model(&content));

        let mut tags = hints.tags.clone();
        for tag in enrich::extract_tags(&content) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let mut draft = PromptDraft::new(content).tags(tags);
        if let Some(category) = category {
            draft = draft.category(category);
        }
        if let Some(model) = model {
            draft = draft.model(model);
        }
        if let Some(ref description) = hints.description {
            draft = draft.description(description.clone());
        }
        draft.build()
    }

    /// A poisoned index lock degrades to the current index state; the index
    /// is a rebuildable accelerator, never the source of truth.
    fn lock_index(&self) -> MutexGuard<'_, SimilarityIndex> {
        match self.index.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("similarity index lock poisoned; continuing with current state");
                self.index.clear_poison();
                poisoned.into_inner()
            }
        }
    }
}
