use std::collections::BTreeMap;

use chrono::Utc;
use promptledger_core::{compute_trend, Prompt, ScoreKind, ScoreReport, TrendWindow};

use super::{AnalysisContext, Analyzer};
use crate::error::ServiceError;

/// Compares the prompt's current metrics window against the previous one and
/// flags significant shifts (≥ 10% change of either mean).
pub struct TrendAnalyzer {
    window: TrendWindow,
}

impl TrendAnalyzer {
    pub fn new(window: TrendWindow) -> Self {
        Self { window }
    }
}

impl Analyzer for TrendAnalyzer {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn kind(&self) -> ScoreKind {
        ScoreKind::Trend
    }

    fn analyze(
        &self,
        prompt: &Prompt,
        ctx: &AnalysisContext<'_>,
    ) -> Result<ScoreReport, ServiceError> {
        let insight = compute_trend(self.window, ctx.history, Utc::now());

        let mut components = BTreeMap::new();
        if let Some(pct) = insight.quality_change_pct {
            components.insert("quality_change_pct".to_string(), pct);
        }
        if let Some(pct) = insight.efficiency_change_pct {
            components.insert("efficiency_change_pct".to_string(), pct);
        }
        components.insert("samples".to_string(), insight.samples as f64);

        Ok(ScoreReport {
            prompt_id: prompt.id.clone(),
            analyzer: self.name().to_string(),
            kind: self.kind(),
            score: insight.quality_change_pct.unwrap_or(0.0),
            components,
            flagged: insight.significant,
            analyzed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use promptledger_core::{MetricsPoint, PromptDraft};

    use super::*;

    fn point(days_ago: i64, quality: f64) -> MetricsPoint {
        MetricsPoint {
            prompt_id: "p1".to_string(),
            recorded_at: Utc::now() - Duration::days(days_ago),
            quality: Some(quality),
            efficiency: Some(50.0),
            total_tokens: None,
        }
    }

    #[test]
    fn test_significant_shift_is_flagged() {
        let prompt = PromptDraft::new("trending prompt").build();
        let history = vec![point(40, 50.0), point(35, 50.0), point(10, 65.0), point(5, 65.0)];
        let ctx = AnalysisContext { history: &history, reference: &[], avg_rating: None };

        let report = TrendAnalyzer::new(TrendWindow::Month).analyze(&prompt, &ctx).unwrap();
        assert!(report.flagged);
        assert!((report.score - 30.0).abs() < 1e-9);
        assert_eq!(report.components["samples"], 2.0);
    }

    #[test]
    fn test_flat_history_not_flagged() {
        let prompt = PromptDraft::new("steady prompt").build();
        let history = vec![point(40, 60.0), point(10, 61.0)];
        let ctx = AnalysisContext { history: &history, reference: &[], avg_rating: None };

        let report = TrendAnalyzer::new(TrendWindow::Month).analyze(&prompt, &ctx).unwrap();
        assert!(!report.flagged);
    }

    #[test]
    fn test_no_baseline_scores_zero() {
        let prompt = PromptDraft::new("fresh prompt").build();
        let ctx = AnalysisContext { history: &[], reference: &[], avg_rating: None };

        let report = TrendAnalyzer::new(TrendWindow::Week).analyze(&prompt, &ctx).unwrap();
        assert_eq!(report.score, 0.0);
        assert!(!report.flagged);
        assert!(!report.components.contains_key("quality_change_pct"));
    }
}
