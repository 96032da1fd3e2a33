//! Pluggable scoring engine.
//!
//! Analyzers share one strategy contract; adding a new analyzer means
//! registering another implementation, never editing the engine or its
//! callers.

mod efficiency;
mod quality;
mod trend;

pub use efficiency::EfficiencyAnalyzer;
pub use quality::QualityAnalyzer;
pub use trend::TrendAnalyzer;

use std::sync::Arc;

use promptledger_core::{
    MetricsPoint, Prompt, PromptFilter, QualityWeights, ResourceSample, ScoreKind, ScoreReport,
    TrendWindow,
};
use promptledger_storage::Store;

use crate::error::ServiceError;
use crate::stats_service::StatsService;

/// Everything an analyzer may consult besides the prompt itself.
pub struct AnalysisContext<'a> {
    /// The prompt's own metrics history, oldest first.
    pub history: &'a [MetricsPoint],
    /// Resource numbers of recently touched prompts; the efficiency
    /// percentile baseline.
    pub reference: &'a [ResourceSample],
    /// Mean feedback rating for the prompt, when it has feedback.
    pub avg_rating: Option<f64>,
}

/// Strategy contract shared by all analyzers.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Which fixed metric column the score feeds, if any.
    fn kind(&self) -> ScoreKind;

    fn analyze(
        &self,
        prompt: &Prompt,
        ctx: &AnalysisContext<'_>,
    ) -> Result<ScoreReport, ServiceError>;
}

/// How many recent prompts form the efficiency reference window.
const REFERENCE_WINDOW_SIZE: usize = 200;

/// Runs registered analyzers and persists quality/efficiency results.
pub struct ScoringEngine {
    store: Store,
    stats: Arc<StatsService>,
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl ScoringEngine {
    /// Engine with no analyzers; register them explicitly.
    pub fn new(store: Store, stats: Arc<StatsService>) -> Self {
        Self { store, stats, analyzers: Vec::new() }
    }

    /// Engine with the three built-in analyzers.
    pub fn with_defaults(store: Store, stats: Arc<StatsService>, weights: QualityWeights) -> Self {
        let mut engine = Self::new(store, stats);
        engine.register(Box::new(QualityAnalyzer::new(weights)));
        engine.register(Box::new(EfficiencyAnalyzer));
        engine.register(Box::new(TrendAnalyzer::new(TrendWindow::Month)));
        engine
    }

    pub fn register(&mut self, analyzer: Box<dyn Analyzer>) {
        self.analyzers.push(analyzer);
    }

    pub fn analyzer_names(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    /// Run one analyzer (by name) or all of them against a stored prompt,
    /// persisting quality/efficiency scores and the metrics-history row.
    pub fn analyze(
        &self,
        prompt_id: &str,
        only: Option<&str>,
    ) -> Result<Vec<ScoreReport>, ServiceError> {
        let prompt = self.store.get(prompt_id)?;
        self.analyze_prompt(&prompt, only)
    }

    /// Analyze every prompt matching `filter`. Per-prompt failures are
    /// logged and skipped so one bad row cannot halt a bulk run.
    pub fn analyze_bulk(
        &self,
        filter: &PromptFilter,
    ) -> Result<Vec<(String, Vec<ScoreReport>)>, ServiceError> {
        let prompts = self.store.list(filter)?;
        let mut results = Vec::with_capacity(prompts.len());
        for prompt in &prompts {
            match self.analyze_prompt(prompt, None) {
                Ok(reports) => results.push((prompt.id.clone(), reports)),
                Err(e) => {
                    tracing::warn!(prompt_id = %prompt.id, error = %e, "bulk analysis: skipping prompt");
                }
            }
        }
        Ok(results)
    }

    fn analyze_prompt(
        &self,
        prompt: &Prompt,
        only: Option<&str>,
    ) -> Result<Vec<ScoreReport>, ServiceError> {
        let history = self.store.metrics_history(&prompt.id, None)?;
        let reference = self.store.reference_window(REFERENCE_WINDOW_SIZE)?;
        let avg_rating = self.store.average_rating(&prompt.id)?;
        let ctx = AnalysisContext { history: &history, reference: &reference, avg_rating };

        let mut reports = Vec::new();
        for analyzer in &self.analyzers {
            if only.is_some_and(|name| name != analyzer.name()) {
                continue;
            }
            reports.push(analyzer.analyze(prompt, &ctx)?);
        }
        if let Some(name) = only {
            if reports.is_empty() {
                return Err(ServiceError::InvalidInput(format!("unknown analyzer: {name}")));
            }
        }

        let quality = score_of(&reports, ScoreKind::Quality);
        let efficiency = score_of(&reports, ScoreKind::Efficiency);
        if quality.is_some() || efficiency.is_some() {
            self.store.save_scores(&prompt.id, quality, efficiency)?;
            self.stats.invalidate_aggregates();
        }

        Ok(reports)
    }
}

fn score_of(reports: &[ScoreReport], kind: ScoreKind) -> Option<f64> {
    reports.iter().find(|r| r.kind == kind).map(|r| r.score)
}
