//! Query filter model and the compact filter expression syntax.
//!
//! Expressions combine prefixed terms and free text, e.g.
//! `category:code-generation tag:rust quality:>80 since:2024-01-01 parser`.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::FilterError;
use crate::prompt::PromptStatus;

/// Hard cap on list results, applied when the caller asks for more.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Filter for listing prompts. All populated fields are AND-combined.
#[derive(Debug, Clone, Default)]
pub struct PromptFilter {
    pub category: Option<String>,
    /// Prompt must carry at least one of these tags.
    pub tags: Vec<String>,
    pub status: Option<PromptStatus>,
    pub min_quality: Option<f64>,
    pub max_quality: Option<f64>,
    pub min_efficiency: Option<f64>,
    pub max_efficiency: Option<f64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Substring match against content.
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PromptFilter {
    /// Effective limit with the cap applied.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(MAX_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

/// Parse a filter expression into a [`PromptFilter`].
///
/// Recognized prefixes: `category:`, `tag:`, `status:`, `quality:`,
/// `efficiency:`, `since:`, `until:`, `limit:`, `offset:`. Score terms take
/// an optional comparison operator (`>`, `>=`, `<`, `<=`, `=`). Unprefixed
/// terms accumulate into the free-text search.
pub fn parse_filter_query(query: &str) -> Result<PromptFilter, FilterError> {
    let mut filter = PromptFilter::default();
    let mut search_terms: Vec<String> = Vec::new();

    for part in split_terms(query) {
        match part.split_once(':') {
            Some(("category", value)) => filter.category = Some(value.to_string()),
            Some(("tag", value)) => filter.tags.push(value.to_string()),
            Some(("status", value)) => {
                filter.status = Some(value.parse::<PromptStatus>().map_err(FilterError)?);
            }
            Some(("quality", value)) => {
                apply_score_bound(value, &mut filter.min_quality, &mut filter.max_quality)?;
            }
            Some(("efficiency", value)) => {
                apply_score_bound(value, &mut filter.min_efficiency, &mut filter.max_efficiency)?;
            }
            Some(("since", value)) => filter.created_after = Some(parse_date(value)?),
            Some(("until", value)) => filter.created_before = Some(parse_date(value)?),
            Some(("limit", value)) => {
                filter.limit = Some(parse_usize("limit", value)?);
            }
            Some(("offset", value)) => {
                filter.offset = Some(parse_usize("offset", value)?);
            }
            _ => search_terms.push(part),
        }
    }

    if !search_terms.is_empty() {
        filter.search = Some(search_terms.join(" "));
    }
    Ok(filter)
}

/// Split on whitespace while keeping quoted phrases together.
fn split_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in query.chars() {
        match ch {
            '"' | '\'' if quote.is_none() => quote = Some(ch),
            c if quote == Some(c) => quote = None,
            c if c.is_whitespace() && quote.is_none() => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

fn apply_score_bound(
    value: &str,
    min: &mut Option<f64>,
    max: &mut Option<f64>,
) -> Result<(), FilterError> {
    let (op, number) = if let Some(rest) = value.strip_prefix(">=") {
        (">=", rest)
    } else if let Some(rest) = value.strip_prefix("<=") {
        ("<=", rest)
    } else if let Some(rest) = value.strip_prefix('>') {
        (">", rest)
    } else if let Some(rest) = value.strip_prefix('<') {
        ("<", rest)
    } else if let Some(rest) = value.strip_prefix('=') {
        ("=", rest)
    } else {
        ("=", value)
    };

    let score: f64 = number
        .trim()
        .parse()
        .map_err(|_| FilterError(format!("score bound is not a number: {value}")))?;
    if !(0.0..=100.0).contains(&score) {
        return Err(FilterError(format!("score bound {score} outside [0, 100]")));
    }

    match op {
        ">" | ">=" => *min = Some(score),
        "<" | "<=" => *max = Some(score),
        _ => {
            *min = Some(score);
            *max = Some(score);
        }
    }
    Ok(())
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, FilterError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc())
        .map_err(|_| FilterError(format!("unparseable date: {value}")))
}

fn parse_usize(label: &str, value: &str) -> Result<usize, FilterError> {
    value
        .parse()
        .map_err(|_| FilterError(format!("{label} is not a number: {value}")))
}
