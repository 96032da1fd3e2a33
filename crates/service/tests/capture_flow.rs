//! End-to-end capture pipeline tests over a real on-disk store.

use std::sync::Arc;
use std::time::Duration;

use promptledger_core::{parse_filter_query, LedgerConfig, PromptFilter, TrendWindow};
use promptledger_service::{
    CaptureHints, CaptureOutcome, CaptureService, CaptureSource, ScoringEngine, ServiceError,
    StatsService,
};
use promptledger_storage::Store;
use tempfile::TempDir;

fn stack(configure: impl FnOnce(&mut LedgerConfig)) -> (Arc<CaptureService>, Store, Arc<StatsService>, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = Store::open(&temp.path().join("ledger.db")).unwrap();

    let mut config = LedgerConfig::default();
    config.auto_analyze = false;
    configure(&mut config);

    let stats = Arc::new(StatsService::new(store.clone(), Duration::from_secs(60)));
    let scoring = Arc::new(ScoringEngine::with_defaults(
        store.clone(),
        Arc::clone(&stats),
        config.quality_weights,
    ));
    let capture =
        Arc::new(CaptureService::new(store.clone(), &config, scoring, Arc::clone(&stats)).unwrap());
    (capture, store, stats, temp)
}

fn inline(text: &str) -> CaptureSource {
    CaptureSource::Inline(text.to_string())
}

fn created(outcome: CaptureOutcome) -> promptledger_core::Prompt {
    match outcome {
        CaptureOutcome::Created(prompt) => prompt,
        other => panic!("expected Created, got {other:?}"),
    }
}

#[test]
fn test_identical_capture_bumps_usage_instead_of_new_row() {
    let (capture, store, _stats, _temp) = stack(|_| {});

    let first = created(
        capture.capture(inline("Write a function to reverse a string"), CaptureHints::default()).unwrap(),
    );
    assert_eq!(first.metrics.usage_count, 1);

    let second = capture
        .capture(inline("Write a function to reverse a string"), CaptureHints::default())
        .unwrap();
    match second {
        CaptureOutcome::Duplicate(prompt) => {
            assert_eq!(prompt.id, first.id);
            assert_eq!(prompt.metrics.usage_count, 2);
        }
        other => panic!("expected Duplicate, got {other:?}"),
    }

    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_normalization_differences_still_deduplicate() {
    let (capture, store, _stats, _temp) = stack(|_| {});

    created(capture.capture(inline("Summarize the incident report\n"), CaptureHints::default()).unwrap());
    let outcome = capture
        .capture(inline("Summarize the incident report\r\n\r\n"), CaptureHints::default())
        .unwrap();

    assert!(matches!(outcome, CaptureOutcome::Duplicate(_)));
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_near_duplicate_withheld_with_candidate() {
    let (capture, store, _stats, _temp) = stack(|_| {});

    let first = created(
        capture.capture(inline("Write a function to reverse a string"), CaptureHints::default()).unwrap(),
    );

    let outcome = capture
        .capture(inline("Write a function to reverse a string!"), CaptureHints::default())
        .unwrap();
    match outcome {
        CaptureOutcome::NearDuplicate { candidate_id, similarity } => {
            assert_eq!(candidate_id, first.id);
            assert!(similarity >= 0.95);
        }
        other => panic!("expected NearDuplicate, got {other:?}"),
    }

    // Nothing persisted for the near-duplicate.
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_lower_threshold_catches_looser_matches() {
    let (capture, store, _stats, _temp) = stack(|config| config.similarity_threshold = 0.3);

    created(capture.capture(
        inline("Explain the borrow checker rules with three concrete examples"),
        CaptureHints::default(),
    )
    .unwrap());

    let outcome = capture
        .capture(
            inline("Explain the borrow checker rules with several concrete examples please"),
            CaptureHints::default(),
        )
        .unwrap();
    assert!(matches!(outcome, CaptureOutcome::NearDuplicate { .. }));
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_hints_win_over_detection() {
    let (capture, _store, _stats, _temp) = stack(|_| {});

    let hints = CaptureHints {
        category: Some("curated".to_string()),
        tags: vec!["pinned".to_string()],
        model: Some("claude-3-opus".to_string()),
        description: Some("hand-filed".to_string()),
    };
    // Content that detection would classify as code-generation/rust.
    let prompt = created(
        capture.capture(inline("Write a function in Rust that parses JSON"), hints).unwrap(),
    );

    assert_eq!(prompt.category.as_deref(), Some("curated"));
    assert!(prompt.tags.contains(&"pinned".to_string()));
    // Detection still supplements tags the caller did not provide.
    assert!(prompt.tags.contains(&"rust".to_string()));
    assert_eq!(prompt.model, "claude-3-opus");
    assert_eq!(prompt.description.as_deref(), Some("hand-filed"));
}

#[test]
fn test_detection_fills_missing_hints() {
    let (capture, _store, _stats, _temp) = stack(|_| {});

    let prompt = created(
        capture
            .capture(inline("Write unit tests for the Python payment client"), CaptureHints::default())
            .unwrap(),
    );
    assert_eq!(prompt.category.as_deref(), Some("testing"));
    assert!(prompt.tags.contains(&"python".to_string()));
}

#[test]
fn test_empty_content_is_invalid_input() {
    let (capture, _store, _stats, _temp) = stack(|_| {});

    let err = capture.capture(inline("   \n\n  "), CaptureHints::default()).unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[test]
fn test_capture_from_file_and_missing_file() {
    let (capture, _store, _stats, temp) = stack(|_| {});

    let path = temp.path().join("prompt.md");
    std::fs::write(&path, "Draft the quarterly engineering update").unwrap();
    let prompt = created(
        capture.capture(CaptureSource::File(path), CaptureHints::default()).unwrap(),
    );
    assert_eq!(prompt.content, "Draft the quarterly engineering update");

    let err = capture
        .capture(CaptureSource::File(temp.path().join("absent.md")), CaptureHints::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::Source(_)));
}

#[test]
fn test_auto_analyze_scores_new_captures() {
    let (capture, store, _stats, _temp) = stack(|config| config.auto_analyze = true);

    let prompt = created(
        capture
            .capture(
                inline("Write a Rust function that validates JSON input. Must return a Result."),
                CaptureHints::default(),
            )
            .unwrap(),
    );

    let quality = prompt.metrics.quality_score.expect("auto-analysis sets quality");
    let efficiency = prompt.metrics.efficiency_score.expect("auto-analysis sets efficiency");
    assert!((0.0..=100.0).contains(&quality));
    assert!((0.0..=100.0).contains(&efficiency));

    // Initial row from create plus the scoring run.
    let history = store.metrics_history(&prompt.id, None).unwrap();
    assert!(history.len() >= 2);
}

#[test]
fn test_update_and_revert_flow() {
    let (capture, store, _stats, _temp) = stack(|_| {});

    let prompt = created(capture.capture(inline("version one text"), CaptureHints::default()).unwrap());
    capture.update_content(&prompt.id, "version two text").unwrap();
    let updated = capture.update_content(&prompt.id, "version three text").unwrap();
    assert_eq!(updated.current_version, 3);

    let reverted = capture.revert(&prompt.id, 1).unwrap();
    assert_eq!(reverted.current_version, 4);
    assert_eq!(reverted.content, "version one text");

    let history = store.history(&prompt.id).unwrap();
    assert_eq!(history.len(), 4);
    for (index, version) in history.iter().enumerate() {
        assert_eq!(version.version_number, index as i64 + 1);
    }

    // The index follows the current content: re-capturing version one's
    // text is now an exact duplicate again.
    let outcome = capture.capture(inline("version one text"), CaptureHints::default()).unwrap();
    assert!(matches!(outcome, CaptureOutcome::Duplicate(_)));
}

#[test]
fn test_feedback_rating_bounds() {
    let (capture, store, _stats, _temp) = stack(|_| {});
    let prompt = created(capture.capture(inline("rate this prompt"), CaptureHints::default()).unwrap());

    let err = capture.attach_feedback(&prompt.id, 0, None).unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    let err = capture.attach_feedback(&prompt.id, 6, None).unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    capture.attach_feedback(&prompt.id, 4, Some("solid")).unwrap();
    assert_eq!(store.feedback_for(&prompt.id).unwrap().len(), 1);
}

#[test]
fn test_delete_forgets_prompt_everywhere() {
    let (capture, store, _stats, _temp) = stack(|_| {});

    let prompt = created(
        capture.capture(inline("Delete this prompt and forget it"), CaptureHints::default()).unwrap(),
    );
    capture.delete(&prompt.id).unwrap();
    assert_eq!(store.count().unwrap(), 0);

    // Neither the exact path nor the similarity index remembers it.
    let outcome = capture
        .capture(inline("Delete this prompt and forget it"), CaptureHints::default())
        .unwrap();
    assert!(matches!(outcome, CaptureOutcome::Created(_)));
}

#[test]
fn test_stats_reflect_writes_through_cache() {
    let (capture, _store, stats, _temp) = stack(|_| {});

    let before = stats.overview().unwrap();
    assert_eq!(before.total_prompts, 0);

    created(capture.capture(inline("first tracked prompt"), CaptureHints::default()).unwrap());
    let after = stats.overview().unwrap();
    assert_eq!(after.total_prompts, 1);
    assert_eq!(after.total_captures, 1);

    capture.capture(inline("first tracked prompt"), CaptureHints::default()).unwrap();
    let after_dup = stats.overview().unwrap();
    assert_eq!(after_dup.total_prompts, 1);
    assert_eq!(after_dup.total_captures, 2);

    // Trend over an empty scoring history is quiet, not an error.
    let trend = stats.trend(TrendWindow::Week).unwrap();
    assert!(!trend.significant);
}

#[test]
fn test_filter_query_drives_list() {
    let (capture, store, _stats, _temp) = stack(|_| {});

    created(capture.capture(
        inline("Write a function that merges two sorted Rust vectors"),
        CaptureHints::default(),
    )
    .unwrap());
    created(capture.capture(
        inline("Document the deployment checklist for operators"),
        CaptureHints::default(),
    )
    .unwrap());

    let filter = parse_filter_query("category:code-generation tag:rust").unwrap();
    let hits = store.list(&filter).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("sorted Rust vectors"));

    let none = store.list(&parse_filter_query("category:missing").unwrap()).unwrap();
    assert!(none.is_empty());

    let all = store.list(&PromptFilter::default()).unwrap();
    assert_eq!(all.len(), 2);
}
