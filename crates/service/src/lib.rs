//! Service layer for promptledger
//!
//! Centralizes business logic between external callers (CLI, reporting) and
//! the storage layer: capture with dedup, pluggable scoring, cached
//! aggregates, and the file-system watch loop.

mod cache;
mod capture_service;
mod error;
mod scoring_service;
mod stats_service;
mod watch_service;

pub use cache::TtlCache;
pub use capture_service::{CaptureHints, CaptureOutcome, CaptureService, CaptureSource};
pub use error::ServiceError;
pub use scoring_service::{AnalysisContext, Analyzer, EfficiencyAnalyzer, QualityAnalyzer, ScoringEngine, TrendAnalyzer};
pub use stats_service::StatsService;
pub use watch_service::{start_watch, WatchHandle, WatchOutcome, WatchReport, WatchState};
