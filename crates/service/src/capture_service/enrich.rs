//! Lexical enrichment of captured content.
//!
//! Fills category, tags, and model only when the caller supplied no hint;
//! hints always win.

const CATEGORY_RULES: &[(&str, &[&str])] = &[
    ("code-generation", &["write a function", "implement", "create a class", "code that"]),
    ("documentation", &["document", "readme", "explain", "description"]),
    ("testing", &["test", "unit test", "spec"]),
    ("debugging", &["debug", "fix", "error", "bug"]),
    ("analysis", &["analyze", "review"]),
];

pub(crate) fn detect_category(content: &str) -> Option<String> {
    let lower = content.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
        .map(|(category, _)| (*category).to_string())
}

const LANGUAGE_TAGS: &[(&str, &str)] = &[
    ("rust", "rust"),
    ("python", "python"),
    ("typescript", "typescript"),
    ("javascript", "javascript"),
    ("java", "java"),
    ("kotlin", "kotlin"),
    ("swift", "swift"),
    ("ruby", "ruby"),
    ("php", "php"),
    ("c++", "cpp"),
];

const FRAMEWORK_TAGS: &[(&str, &str)] = &[
    ("react", "react"),
    ("vue", "vue"),
    ("angular", "angular"),
    ("django", "django"),
    ("flask", "flask"),
    ("axum", "axum"),
    ("rails", "rails"),
    ("spring", "spring"),
];

const TOPIC_TAGS: &[(&str, &[&str])] = &[
    ("api", &["api", "rest", "graphql", "endpoint"]),
    ("database", &["database", "sql", "sqlite", "postgres"]),
    ("async", &["async", "concurrent", "parallel"]),
    ("security", &["security", "auth", "encrypt"]),
];

pub(crate) fn extract_tags(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    let mut tags = Vec::new();

    for (marker, tag) in LANGUAGE_TAGS.iter().chain(FRAMEWORK_TAGS) {
        if lower.contains(marker) {
            tags.push((*tag).to_string());
        }
    }
    for (tag, markers) in TOPIC_TAGS {
        if markers.iter().any(|m| lower.contains(m)) {
            tags.push((*tag).to_string());
        }
    }
    tags
}

const MODEL_HINTS: &[(&str, &str)] = &[
    ("opus", "claude-3-opus"),
    ("haiku", "claude-3-haiku"),
    ("sonnet", "claude-3-5-sonnet"),
];

pub(crate) fn detect_model(content: &str) -> Option<String> {
    let lower = content.to_lowercase();
    MODEL_HINTS
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, model)| (*model).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_category() {
        assert_eq!(
            detect_category("Write a function that sorts an array").as_deref(),
            Some("code-generation")
        );
        assert_eq!(
            detect_category("Document this API endpoint").as_deref(),
            Some("documentation")
        );
        assert_eq!(detect_category("Fix the login bug").as_deref(), Some("debugging"));
        assert_eq!(detect_category("Good morning"), None);
    }

    #[test]
    fn test_extract_tags_languages_and_topics() {
        let tags = extract_tags("Convert this Python service to Rust with a REST API");
        assert!(tags.contains(&"python".to_string()));
        assert!(tags.contains(&"rust".to_string()));
        assert!(tags.contains(&"api".to_string()));
    }

    #[test]
    fn test_extract_tags_frameworks() {
        let tags = extract_tags("Create a React component backed by Django");
        assert!(tags.contains(&"react".to_string()));
        assert!(tags.contains(&"django".to_string()));
    }

    #[test]
    fn test_detect_model() {
        assert_eq!(detect_model("use opus for this").as_deref(), Some("claude-3-opus"));
        assert_eq!(detect_model("plain prompt"), None);
    }
}
