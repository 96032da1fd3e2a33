//! Read-through cached aggregates.
//!
//! Every cache key lives under the `stats:` prefix; write paths call
//! [`StatsService::invalidate_aggregates`] as part of the same logical
//! operation, so stale aggregates never outlive the write that changed them.

use std::time::Duration;

use chrono::Utc;
use promptledger_core::{compute_trend, TrendInsight, TrendWindow};
use promptledger_storage::{LedgerStats, PromptSummary, Store};

use crate::cache::TtlCache;
use crate::error::ServiceError;

pub struct StatsService {
    store: Store,
    overview: TtlCache<LedgerStats>,
    performers: TtlCache<Vec<PromptSummary>>,
    trends: TtlCache<TrendInsight>,
}

impl StatsService {
    pub fn new(store: Store, cache_ttl: Duration) -> Self {
        Self {
            store,
            overview: TtlCache::new(cache_ttl),
            performers: TtlCache::new(cache_ttl),
            trends: TtlCache::new(cache_ttl),
        }
    }

    /// Corpus-wide aggregate numbers.
    pub fn overview(&self) -> Result<LedgerStats, ServiceError> {
        if let Some(cached) = self.overview.get("stats:overview") {
            return Ok(cached);
        }
        let stats = self.store.aggregate_stats()?;
        self.overview.set("stats:overview", stats.clone());
        Ok(stats)
    }

    pub fn top_performers(&self, limit: usize) -> Result<Vec<PromptSummary>, ServiceError> {
        let key = format!("stats:top:{limit}");
        if let Some(cached) = self.performers.get(&key) {
            return Ok(cached);
        }
        let rows = self.store.top_performers(limit)?;
        self.performers.set(key, rows.clone());
        Ok(rows)
    }

    pub fn bottom_performers(&self, limit: usize) -> Result<Vec<PromptSummary>, ServiceError> {
        let key = format!("stats:bottom:{limit}");
        if let Some(cached) = self.performers.get(&key) {
            return Ok(cached);
        }
        let rows = self.store.bottom_performers(limit)?;
        self.performers.set(key, rows.clone());
        Ok(rows)
    }

    /// Corpus-level quality/efficiency trend over the given rolling window.
    pub fn trend(&self, window: TrendWindow) -> Result<TrendInsight, ServiceError> {
        let key = format!("stats:trend:{}", window.as_str());
        if let Some(cached) = self.trends.get(&key) {
            return Ok(cached);
        }

        let now = Utc::now();
        let since = now - window.duration() * 2;
        let points = self.store.metrics_history_all(Some(since))?;
        let insight = compute_trend(window, &points, now);
        self.trends.set(key, insight.clone());
        Ok(insight)
    }

    /// Drop every cached aggregate. Called by write paths.
    pub fn invalidate_aggregates(&self) {
        self.overview.invalidate_prefix("stats:");
        self.performers.invalidate_prefix("stats:");
        self.trends.invalidate_prefix("stats:");
    }
}
