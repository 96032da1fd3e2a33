use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::{estimate_tokens, fingerprint, normalize};

/// Lifecycle status of a prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    #[default]
    Active,
    Archived,
    Deprecated,
    Testing,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Deprecated => "deprecated",
            Self::Testing => "testing",
        }
    }

    /// Whether the status machine permits moving from `self` to `to`.
    ///
    /// Allowed: Active ⇄ Archived, Active → Deprecated, Testing → Active.
    /// Deprecated is terminal. Self-transitions are rejected.
    pub fn can_transition(&self, to: PromptStatus) -> bool {
        matches!(
            (self, to),
            (Self::Active, Self::Archived)
                | (Self::Archived, Self::Active)
                | (Self::Active, Self::Deprecated)
                | (Self::Testing, Self::Active)
        )
    }
}

impl std::fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PromptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "deprecated" => Ok(Self::Deprecated),
            "testing" => Ok(Self::Testing),
            other => Err(format!("unknown prompt status: {other}")),
        }
    }
}

/// A captured prompt, current-version view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    /// Normalized content of the current version.
    pub content: String,
    /// SHA-256 hex digest of the normalized content.
    pub fingerprint: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    /// Source model the prompt was written for.
    pub model: String,
    pub status: PromptStatus,
    /// Number of the current version; versions start at 1.
    pub current_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metrics: PromptMetrics,
}

/// Embedded metrics snapshot carried on every prompt row.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptMetrics {
    pub quality_score: Option<f64>,
    pub efficiency_score: Option<f64>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub execution_time_ms: Option<u64>,
    pub estimated_cost: Option<f64>,
    pub usage_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PromptMetrics {
    /// Total tokens, when either side is known.
    pub fn total_tokens(&self) -> Option<u32> {
        match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
        }
    }
}

/// Immutable snapshot of a prompt's content at one revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub prompt_id: String,
    pub version_number: i64,
    pub content: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// Minimum accepted feedback rating.
pub const MIN_RATING: u8 = 1;
/// Maximum accepted feedback rating.
pub const MAX_RATING: u8 = 5;

/// Append-only feedback record attached to one prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub prompt_id: String,
    /// Rating within [`MIN_RATING`]..=[`MAX_RATING`].
    pub rating: u8,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Metadata fields that can be updated without creating a new version.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct PromptPatch {
    pub category: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub tags: Option<Vec<String>>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub execution_time_ms: Option<u64>,
    pub estimated_cost: Option<f64>,
}

impl PromptPatch {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.description.is_none()
            && self.model.is_none()
            && self.tags.is_none()
            && self.input_tokens.is_none()
            && self.output_tokens.is_none()
            && self.execution_time_ms.is_none()
            && self.estimated_cost.is_none()
    }
}

/// Builder for prompts constructed with explicit metadata.
#[derive(Debug, Clone)]
pub struct PromptDraft {
    content: String,
    category: Option<String>,
    tags: Vec<String>,
    description: Option<String>,
    model: Option<String>,
    status: PromptStatus,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    execution_time_ms: Option<u64>,
    estimated_cost: Option<f64>,
}

/// Model name assumed when the caller does not supply one.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet";

impl PromptDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            category: None,
            tags: Vec::new(),
            description: None,
            model: None,
            status: PromptStatus::default(),
            input_tokens: None,
            output_tokens: None,
            execution_time_ms: None,
            estimated_cost: None,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn status(mut self, status: PromptStatus) -> Self {
        self.status = status;
        self
    }

    pub fn input_tokens(mut self, tokens: u32) -> Self {
        self.input_tokens = Some(tokens);
        self
    }

    pub fn output_tokens(mut self, tokens: u32) -> Self {
        self.output_tokens = Some(tokens);
        self
    }

    pub fn execution_time_ms(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    pub fn estimated_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = Some(cost);
        self
    }

    /// Normalize the content, fingerprint it, and produce a version-1 prompt.
    ///
    /// Input tokens are estimated from the content length when not supplied.
    pub fn build(self) -> Prompt {
        let content = normalize(&self.content);
        let digest = fingerprint(&content);
        let input_tokens = self.input_tokens.or_else(|| Some(estimate_tokens(&content)));
        let now = Utc::now();

        Prompt {
            id: Uuid::new_v4().to_string(),
            fingerprint: digest,
            content,
            category: self.category,
            tags: self.tags,
            description: self.description,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            status: self.status,
            current_version: 1,
            created_at: now,
            updated_at: now,
            metrics: PromptMetrics {
                input_tokens,
                output_tokens: self.output_tokens,
                execution_time_ms: self.execution_time_ms,
                estimated_cost: self.estimated_cost,
                usage_count: 1,
                ..PromptMetrics::default()
            },
        }
    }
}
