use std::collections::BTreeMap;

use chrono::Utc;
use promptledger_core::{
    Prompt, QualityBreakdown, QualityWeights, ScoreKind, ScoreReport,
};

use super::{AnalysisContext, Analyzer};
use crate::error::ServiceError;

/// Scores prompt wording on clarity, completeness, specificity, and
/// guidance, combining them with configurable weights on a 100-point scale.
pub struct QualityAnalyzer {
    weights: QualityWeights,
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self::new(QualityWeights::default())
    }
}

impl QualityAnalyzer {
    pub fn new(weights: QualityWeights) -> Self {
        Self { weights }
    }

    /// Sub-scores on their documented scales plus the weighted total.
    pub fn breakdown(&self, prompt: &Prompt, avg_rating: Option<f64>) -> QualityBreakdown {
        let clarity = clarity_score(&prompt.content);
        let completeness = completeness_score(prompt);
        let specificity = specificity_score(&prompt.content);
        let guidance = guidance_score(&prompt.content, avg_rating);

        let total = (clarity * self.weights.clarity
            + completeness * self.weights.completeness
            + specificity * self.weights.specificity
            + guidance * self.weights.guidance)
            * 100.0;

        QualityBreakdown {
            clarity: clarity * 25.0,
            completeness: completeness * 25.0,
            specificity: specificity * 20.0,
            guidance: guidance * 20.0,
            total: total.clamp(0.0, 100.0),
        }
    }
}

impl Analyzer for QualityAnalyzer {
    fn name(&self) -> &'static str {
        "quality"
    }

    fn kind(&self) -> ScoreKind {
        ScoreKind::Quality
    }

    fn analyze(
        &self,
        prompt: &Prompt,
        ctx: &AnalysisContext<'_>,
    ) -> Result<ScoreReport, ServiceError> {
        let breakdown = self.breakdown(prompt, ctx.avg_rating);

        let mut components = BTreeMap::new();
        components.insert("clarity".to_string(), breakdown.clarity);
        components.insert("completeness".to_string(), breakdown.completeness);
        components.insert("specificity".to_string(), breakdown.specificity);
        components.insert("guidance".to_string(), breakdown.guidance);

        Ok(ScoreReport {
            prompt_id: prompt.id.clone(),
            analyzer: self.name().to_string(),
            kind: self.kind(),
            score: breakdown.total,
            components,
            flagged: false,
            analyzed_at: Utc::now(),
        })
    }
}

const ACTION_VERBS: &[&str] = &[
    "create", "write", "implement", "build", "design", "analyze", "explain", "describe", "list",
    "compare", "convert", "generate", "fix", "debug", "test", "review", "optimize", "refactor",
    "summarize",
];

/// Word-count sweet spot, sentence structure, and action verbs. 0..=1.
fn clarity_score(content: &str) -> f64 {
    let word_count = content.split_whitespace().count();
    let word_score = if (10..=100).contains(&word_count) {
        1.0
    } else if word_count < 10 {
        word_count as f64 / 10.0
    } else {
        ((200.0 - word_count as f64) / 100.0).max(0.0)
    };

    let sentence_count =
        content.matches('.').count() + content.matches('?').count() + content.matches('!').count();
    let sentence_score = if sentence_count > 0 {
        (sentence_count as f64 / (word_count as f64 / 15.0).max(1.0)).min(1.0)
    } else {
        // A single imperative line can still be perfectly clear.
        0.5
    };

    let lower = content.to_lowercase();
    let action_hits = ACTION_VERBS.iter().filter(|verb| lower.contains(*verb)).count();
    let action_score = (action_hits as f64 / 2.0).min(1.0);

    (word_score * 0.3 + sentence_score * 0.3 + action_score * 0.4).clamp(0.0, 1.0)
}

/// Context, examples, constraints, and an expected output shape. 0..=1.
fn completeness_score(prompt: &Prompt) -> f64 {
    let lower = prompt.content.to_lowercase();
    let mut score: f64 = 0.0;

    if prompt.description.is_some() || lower.contains("context") || lower.contains("background") {
        score += 0.25;
    }
    if ["example", "for instance", "such as", "e.g."].iter().any(|m| lower.contains(m)) {
        score += 0.25;
    }
    if ["must", "should", "require", "constraint", "limit"].iter().any(|m| lower.contains(m)) {
        score += 0.25;
    }
    if ["format", "output", "return", "result"].iter().any(|m| lower.contains(m)) {
        score += 0.25;
    }

    // Well-filed prompts tend to be deliberately written.
    if !prompt.tags.is_empty() {
        score += 0.05;
    }
    if prompt.category.is_some() {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

const TECH_TERMS: &[&str] = &[
    "function", "class", "method", "api", "endpoint", "database", "query", "table", "index",
    "cache", "async", "thread", "memory", "performance", "algorithm", "schema",
];

const FORMAT_NAMES: &[&str] = &["json", "xml", "csv", "yaml", "markdown", "toml"];

const LANGUAGE_NAMES: &[&str] = &[
    "rust", "python", "javascript", "typescript", "java", "go", "ruby", "php", "swift", "kotlin",
    "c++", "c#", "sql",
];

/// Numbers, technical vocabulary, and explicit format expectations. 0..=1.
fn specificity_score(content: &str) -> f64 {
    let lower = content.to_lowercase();
    let mut score = 0.0;

    if content.chars().any(|c| c.is_ascii_digit()) {
        score += 0.25;
    }

    let tech_hits = TECH_TERMS.iter().filter(|term| lower.contains(*term)).count();
    score += (tech_hits as f64 / 3.0).min(0.35);

    if FORMAT_NAMES.iter().any(|name| lower.contains(name)) {
        score += 0.2;
    }
    if LANGUAGE_NAMES.iter().any(|name| lower.contains(name)) {
        score += 0.2;
    }

    score.clamp(0.0, 1.0)
}

/// Step structure, list markers, explicit input/output framing, role
/// assignment — blended with historical feedback when available. 0..=1.
fn guidance_score(content: &str, avg_rating: Option<f64>) -> f64 {
    let lower = content.to_lowercase();
    let mut heuristic: f64 = 0.0;

    if ["step", "first", "then", "finally", "1.", "2."].iter().any(|m| lower.contains(m)) {
        heuristic += 0.3;
    }
    if lower.contains("- ") || lower.contains("* ") {
        heuristic += 0.2;
    }
    if ["input", "output", "parameter", "argument"].iter().any(|m| lower.contains(m)) {
        heuristic += 0.25;
    }
    if ["you are", "act as", "role"].iter().any(|m| lower.contains(m)) {
        heuristic += 0.25;
    }
    let heuristic = heuristic.clamp(0.0_f64, 1.0);

    // Ratings run 1..=5; map onto 0..=1 and let real-world outcomes pull the
    // lexical guess.
    match avg_rating {
        Some(rating) => {
            let outcome = ((rating - 1.0) / 4.0).clamp(0.0, 1.0);
            heuristic * 0.7 + outcome * 0.3
        }
        None => heuristic,
    }
}
