//! Analyzer output types and pure trend math.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which fixed metric column an analyzer feeds, if any.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    Quality,
    Efficiency,
    Trend,
    /// Analyzer added by a caller; its score is reported but not persisted
    /// into the embedded snapshot.
    Custom,
}

/// Result of one analyzer run over one prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    pub prompt_id: String,
    pub analyzer: String,
    pub kind: ScoreKind,
    /// Primary score; [0, 100] for quality/efficiency, a percent change for
    /// trend.
    pub score: f64,
    /// Named sub-scores and diagnostics.
    pub components: BTreeMap<String, f64>,
    /// Whether the analyzer considers this result noteworthy.
    pub flagged: bool,
    pub analyzed_at: DateTime<Utc>,
}

/// Quality sub-scores on their documented scales.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityBreakdown {
    /// 0..=25
    pub clarity: f64,
    /// 0..=25
    pub completeness: f64,
    /// 0..=20
    pub specificity: f64,
    /// 0..=20
    pub guidance: f64,
    /// Weighted total, 0..=100.
    pub total: f64,
}

/// One metrics-history row, the unit of trend computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsPoint {
    pub prompt_id: String,
    pub recorded_at: DateTime<Utc>,
    pub quality: Option<f64>,
    pub efficiency: Option<f64>,
    pub total_tokens: Option<u32>,
}

/// Resource numbers for one prompt, used as the efficiency reference window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceSample {
    pub total_tokens: Option<u32>,
    pub execution_time_ms: Option<u64>,
    pub estimated_cost: Option<f64>,
}

/// Rolling window for trend computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendWindow {
    Day,
    Week,
    Month,
}

impl TrendWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::Day => Duration::days(1),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
        }
    }
}

/// Change threshold (percent) above which a trend is flagged significant.
pub const SIGNIFICANT_TREND_PCT: f64 = 10.0;

/// Rate-of-change summary between two adjacent windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendInsight {
    pub window: TrendWindow,
    /// Percent change of the mean quality score, when both windows have data.
    pub quality_change_pct: Option<f64>,
    /// Percent change of the mean efficiency score, when both windows have data.
    pub efficiency_change_pct: Option<f64>,
    /// Points inside the current window.
    pub samples: usize,
    pub significant: bool,
}

/// Compare the current window against the one before it.
///
/// Pure over the supplied points; `now` anchors the windows so callers (and
/// tests) control time.
pub fn compute_trend(window: TrendWindow, points: &[MetricsPoint], now: DateTime<Utc>) -> TrendInsight {
    let span = window.duration();
    let current_start = now - span;
    let previous_start = current_start - span;

    let mut current: Vec<&MetricsPoint> = Vec::new();
    let mut previous: Vec<&MetricsPoint> = Vec::new();
    for point in points {
        if point.recorded_at > current_start && point.recorded_at <= now {
            current.push(point);
        } else if point.recorded_at > previous_start && point.recorded_at <= current_start {
            previous.push(point);
        }
    }

    let quality_change_pct = change_pct(
        mean(previous.iter().filter_map(|p| p.quality)),
        mean(current.iter().filter_map(|p| p.quality)),
    );
    let efficiency_change_pct = change_pct(
        mean(previous.iter().filter_map(|p| p.efficiency)),
        mean(current.iter().filter_map(|p| p.efficiency)),
    );

    let significant = [quality_change_pct, efficiency_change_pct]
        .iter()
        .flatten()
        .any(|pct| pct.abs() >= SIGNIFICANT_TREND_PCT);

    TrendInsight {
        window,
        quality_change_pct,
        efficiency_change_pct,
        samples: current.len(),
        significant,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}

fn change_pct(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    match (previous, current) {
        (Some(prev), Some(cur)) if prev.abs() > f64::EPSILON => {
            Some((cur - prev) / prev.abs() * 100.0)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(days_ago: i64, quality: f64, efficiency: f64) -> MetricsPoint {
        MetricsPoint {
            prompt_id: "p1".to_string(),
            recorded_at: Utc::now() - Duration::days(days_ago),
            quality: Some(quality),
            efficiency: Some(efficiency),
            total_tokens: Some(100),
        }
    }

    #[test]
    fn test_trend_flags_significant_rise() {
        let now = Utc::now();
        // Previous week mean 50, current week mean 60: +20%.
        let points = vec![point(10, 50.0, 50.0), point(9, 50.0, 50.0), point(2, 60.0, 50.0)];
        let insight = compute_trend(TrendWindow::Week, &points, now);

        assert_eq!(insight.samples, 1);
        let change = insight.quality_change_pct.unwrap();
        assert!((change - 20.0).abs() < 1e-9);
        assert!(insight.significant);
    }

    #[test]
    fn test_trend_small_change_not_flagged() {
        let now = Utc::now();
        let points = vec![point(10, 50.0, 50.0), point(2, 52.0, 51.0)];
        let insight = compute_trend(TrendWindow::Week, &points, now);

        assert!(!insight.significant);
        assert!(insight.quality_change_pct.unwrap().abs() < SIGNIFICANT_TREND_PCT);
    }

    #[test]
    fn test_trend_missing_window_yields_none() {
        let now = Utc::now();
        // Only current-window data; no baseline to compare against.
        let points = vec![point(1, 70.0, 70.0)];
        let insight = compute_trend(TrendWindow::Week, &points, now);

        assert_eq!(insight.quality_change_pct, None);
        assert_eq!(insight.efficiency_change_pct, None);
        assert!(!insight.significant);
    }

    #[test]
    fn test_trend_empty_history() {
        let insight = compute_trend(TrendWindow::Month, &[], Utc::now());
        assert_eq!(insight.samples, 0);
        assert!(!insight.significant);
    }

    #[test]
    fn test_trend_window_durations() {
        assert_eq!(TrendWindow::Day.duration(), Duration::days(1));
        assert_eq!(TrendWindow::Week.duration(), Duration::days(7));
        assert_eq!(TrendWindow::Month.duration(), Duration::days(30));
    }
}
