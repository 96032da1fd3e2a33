//! Configuration model.
//!
//! Loading (YAML, CLI flags) happens outside this core; these are the typed
//! inputs the core consumes, with defaults, validation, and path expansion.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::normalize::DEFAULT_MAX_SOURCE_BYTES;
use crate::similarity::DEFAULT_SIMILARITY_THRESHOLD;

/// Weights for the quality sub-scores. Must be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityWeights {
    pub clarity: f64,
    pub completeness: f64,
    pub specificity: f64,
    pub guidance: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            clarity: 0.3,
            completeness: 0.3,
            specificity: 0.2,
            guidance: 0.2,
        }
    }
}

impl QualityWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parts = [self.clarity, self.completeness, self.specificity, self.guidance];
        let sum: f64 = parts.iter().sum();
        if parts.iter().any(|w| *w < 0.0) || (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Weights(sum));
        }
        Ok(())
    }
}

/// Configuration for the file-system watch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Watched directory; may contain `~` or environment variables.
    pub root: String,
    /// File extensions (without dot) that trigger capture.
    pub extensions: Vec<String>,
    /// Quiet period per file before a capture fires.
    pub debounce: Duration,
    /// Poll interval handed to the watcher backend.
    pub poll_interval: Duration,
    /// Category applied to every watched capture.
    pub category: Option<String>,
    /// Tags applied to every watched capture.
    pub tags: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: "~/.promptledger/inbox".to_string(),
            extensions: vec!["txt".to_string(), "md".to_string(), "prompt".to_string()],
            debounce: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            category: None,
            tags: Vec::new(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if self.debounce.is_zero() {
            return Err(ConfigError::ZeroInterval("debounce"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("poll"));
        }
        Ok(())
    }

    /// Expand and canonicalize the watch root.
    ///
    /// The result is always an absolute, environment-expanded, existing
    /// directory; anything less is a configuration error surfaced before
    /// watching starts.
    pub fn resolved_root(&self) -> Result<PathBuf, ConfigError> {
        let expanded = expand_path(&self.root)?;
        let canonical = expanded.canonicalize().map_err(|e| ConfigError::WatchRoot {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;
        if !canonical.is_dir() {
            return Err(ConfigError::WatchRoot {
                path: self.root.clone(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(canonical)
    }

    pub fn matches_extension(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }
}

/// Top-level configuration consumed by the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database location; may contain `~` or environment variables.
    pub db_path: String,
    /// Near-duplicate threshold, open interval (0, 1).
    pub similarity_threshold: f64,
    /// Run quality/efficiency analyzers right after each capture.
    pub auto_analyze: bool,
    pub quality_weights: QualityWeights,
    /// Default TTL for cached aggregates.
    pub cache_ttl: Duration,
    /// Cap on capture source size in bytes.
    pub max_source_bytes: u64,
    pub watch: WatchConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            db_path: data_dir.join("promptledger/ledger.db").to_string_lossy().into_owned(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            auto_analyze: true,
            quality_weights: QualityWeights::default(),
            cache_ttl: Duration::from_secs(300),
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            watch: WatchConfig::default(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold < 1.0) {
            return Err(ConfigError::Threshold(self.similarity_threshold));
        }
        self.quality_weights.validate()?;
        self.watch.validate()
    }

    /// Expanded database path.
    pub fn resolved_db_path(&self) -> Result<PathBuf, ConfigError> {
        expand_path(&self.db_path)
    }
}

/// Expand `~` and `$VAR` references in a configured path.
///
/// A variable that cannot be resolved is an error, never passed through as a
/// literal.
pub fn expand_path(raw: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.into_owned()))
        .map_err(|e| ConfigError::WatchRoot {
            path: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Parse an environment variable with a default fallback.
///
/// Unset returns `default` silently (the expected case); set-but-unparseable
/// logs a warning and returns `default` instead of being silently swallowed.
pub fn env_parse_with_default<T: std::str::FromStr + std::fmt::Display>(var: &str, default: T) -> T {
    match std::env::var(var) {
        Ok(v) => match v.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(var, value = %v, default = %default, "invalid env var value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
