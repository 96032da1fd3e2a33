use std::collections::BTreeMap;

use chrono::Utc;
use promptledger_core::{Prompt, ResourceSample, ScoreKind, ScoreReport};

use super::{AnalysisContext, Analyzer};
use crate::error::ServiceError;

const TOKEN_WEIGHT: f64 = 50.0;
const TIME_WEIGHT: f64 = 30.0;
const COST_WEIGHT: f64 = 20.0;

/// Scores resource frugality relative to the recent corpus, not against
/// absolute constants: each dimension's penalty is the prompt's percentile
/// rank inside the reference window, scaled to that dimension's weight.
///
/// `100 − token_penalty(≤50) − time_penalty(≤30) − cost_penalty(≤20)`,
/// which keeps the result in [0, 100] by construction.
pub struct EfficiencyAnalyzer;

impl Analyzer for EfficiencyAnalyzer {
    fn name(&self) -> &'static str {
        "efficiency"
    }

    fn kind(&self) -> ScoreKind {
        ScoreKind::Efficiency
    }

    fn analyze(
        &self,
        prompt: &Prompt,
        ctx: &AnalysisContext<'_>,
    ) -> Result<ScoreReport, ServiceError> {
        let token_rank = rank_in(
            prompt.metrics.total_tokens().map(f64::from),
            ctx.reference,
            |s| s.total_tokens.map(f64::from),
        );
        let time_rank = rank_in(
            prompt.metrics.execution_time_ms.map(|v| v as f64),
            ctx.reference,
            |s| s.execution_time_ms.map(|v| v as f64),
        );
        let cost_rank =
            rank_in(prompt.metrics.estimated_cost, ctx.reference, |s| s.estimated_cost);

        let token_penalty = (token_rank * TOKEN_WEIGHT).clamp(0.0, TOKEN_WEIGHT);
        let time_penalty = (time_rank * TIME_WEIGHT).clamp(0.0, TIME_WEIGHT);
        let cost_penalty = (cost_rank * COST_WEIGHT).clamp(0.0, COST_WEIGHT);
        let score = (100.0 - token_penalty - time_penalty - cost_penalty).clamp(0.0, 100.0);

        let mut components = BTreeMap::new();
        components.insert("token_penalty".to_string(), token_penalty);
        components.insert("time_penalty".to_string(), time_penalty);
        components.insert("cost_penalty".to_string(), cost_penalty);
        components.insert("reference_size".to_string(), ctx.reference.len() as f64);

        Ok(ScoreReport {
            prompt_id: prompt.id.clone(),
            analyzer: self.name().to_string(),
            kind: self.kind(),
            score,
            components,
            flagged: false,
            analyzed_at: Utc::now(),
        })
    }
}

/// Percentile rank of `value` among the reference samples that carry the
/// same dimension. Unknown values and empty windows rank neutral (0.5).
fn rank_in(
    value: Option<f64>,
    reference: &[ResourceSample],
    dimension: impl Fn(&ResourceSample) -> Option<f64>,
) -> f64 {
    let Some(value) = value else {
        return 0.5;
    };
    let window: Vec<f64> = reference.iter().filter_map(dimension).collect();
    if window.is_empty() {
        return 0.5;
    }

    let below = window.iter().filter(|v| **v < value).count() as f64;
    let equal = window.iter().filter(|v| **v == value).count() as f64;
    (below + equal * 0.5) / window.len() as f64
}

#[cfg(test)]
mod tests {
    use promptledger_core::PromptDraft;

    use super::*;

    fn sample(tokens: u32, time_ms: u64, cost: f64) -> ResourceSample {
        ResourceSample {
            total_tokens: Some(tokens),
            execution_time_ms: Some(time_ms),
            estimated_cost: Some(cost),
        }
    }

    fn reference() -> Vec<ResourceSample> {
        vec![
            sample(100, 500, 0.001),
            sample(200, 1000, 0.002),
            sample(400, 2000, 0.004),
            sample(800, 4000, 0.008),
            sample(1600, 8000, 0.016),
        ]
    }

    fn run(prompt: &Prompt, reference: &[ResourceSample]) -> ScoreReport {
        let ctx = AnalysisContext { history: &[], reference, avg_rating: None };
        EfficiencyAnalyzer.analyze(prompt, &ctx).unwrap()
    }

    #[test]
    fn test_score_always_within_bounds() {
        let reference = reference();
        let frugal = PromptDraft::new("tiny").input_tokens(1).execution_time_ms(1).estimated_cost(0.0001).build();
        let heavy = PromptDraft::new("huge")
            .input_tokens(1_000_000)
            .execution_time_ms(600_000)
            .estimated_cost(50.0)
            .build();

        for prompt in [&frugal, &heavy] {
            let report = run(prompt, &reference);
            assert!((0.0..=100.0).contains(&report.score));
        }
    }

    #[test]
    fn test_frugal_prompt_beats_heavy_prompt() {
        let reference = reference();
        let frugal = PromptDraft::new("tiny prompt")
            .input_tokens(50)
            .execution_time_ms(400)
            .estimated_cost(0.0005)
            .build();
        let heavy = PromptDraft::new("expensive prompt")
            .input_tokens(2000)
            .execution_time_ms(10_000)
            .estimated_cost(0.05)
            .build();

        let frugal_score = run(&frugal, &reference).score;
        let heavy_score = run(&heavy, &reference).score;
        assert!(frugal_score > heavy_score);
        // Cheapest-of-window lands near the top of the scale.
        assert!(frugal_score > 90.0);
        assert!(heavy_score < 10.0);
    }

    #[test]
    fn test_empty_reference_window_is_neutral() {
        let prompt = PromptDraft::new("no baseline yet")
            .input_tokens(500)
            .execution_time_ms(2000)
            .estimated_cost(0.01)
            .build();

        let report = run(&prompt, &[]);
        // All three dimensions rank 0.5: 100 − 25 − 15 − 10.
        assert!((report.score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_dimensions_rank_neutral() {
        let reference = reference();
        let prompt = PromptDraft::new("tokens only").input_tokens(100).build();
        // input_tokens alone: token estimate is overridden, time/cost unknown.

        let report = run(&prompt, &reference);
        assert!((0.0..=100.0).contains(&report.score));
        let time_penalty = report.components["time_penalty"];
        assert!((time_penalty - TIME_WEIGHT * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_rank_midpoint_for_ties() {
        let window = vec![sample(100, 1, 0.1), sample(100, 1, 0.1), sample(300, 1, 0.1)];
        let rank = rank_in(Some(100.0), &window, |s| s.total_tokens.map(f64::from));
        // Two equal values, none below: (0 + 2·0.5) / 3.
        assert!((rank - 1.0 / 3.0).abs() < 1e-9);
    }
}
