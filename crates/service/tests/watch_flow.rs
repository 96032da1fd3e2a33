//! Watch-loop integration tests over a real watcher and on-disk store.

use std::sync::Arc;
use std::time::Duration;

use promptledger_core::LedgerConfig;
use promptledger_service::{
    start_watch, CaptureService, ScoringEngine, StatsService, WatchOutcome, WatchReport,
    WatchState,
};
use promptledger_storage::Store;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);
const QUIET_TIMEOUT: Duration = Duration::from_millis(1500);

fn stack(temp: &TempDir, configure: impl FnOnce(&mut LedgerConfig)) -> (Arc<CaptureService>, Store, LedgerConfig) {
    // RUST_LOG=promptledger_service=debug surfaces the loop's tracing output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let store = Store::open(&temp.path().join("ledger.db")).unwrap();

    let inbox = temp.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();

    let mut config = LedgerConfig::default();
    config.auto_analyze = false;
    config.watch.root = inbox.to_string_lossy().into_owned();
    config.watch.debounce = Duration::from_millis(300);
    config.watch.poll_interval = Duration::from_millis(200);
    configure(&mut config);

    let stats = Arc::new(StatsService::new(store.clone(), Duration::from_secs(60)));
    let scoring = Arc::new(ScoringEngine::with_defaults(
        store.clone(),
        Arc::clone(&stats),
        config.quality_weights,
    ));
    let capture = Arc::new(
        CaptureService::new(store.clone(), &config, scoring, Arc::clone(&stats)).unwrap(),
    );
    (capture, store, config)
}

async fn next_report(rx: &mut broadcast::Receiver<WatchReport>) -> WatchReport {
    timeout(RECV_TIMEOUT, rx.recv()).await.expect("timed out waiting for report").unwrap()
}

async fn wait_for_state(rx: &mut tokio::sync::watch::Receiver<WatchState>, want: WatchState) {
    timeout(RECV_TIMEOUT, rx.wait_for(|state| *state == want))
        .await
        .expect("timed out waiting for state")
        .unwrap();
}

#[tokio::test]
async fn test_rapid_edits_coalesce_into_one_capture() {
    let temp = TempDir::new().unwrap();
    let (capture, store, config) = stack(&temp, |_| {});

    let handle = start_watch(Arc::clone(&capture), config.watch.clone()).unwrap();
    let mut states = handle.state_stream();
    wait_for_state(&mut states, WatchState::Watching).await;
    let mut reports = handle.subscribe();

    // Two writes inside one debounce window must produce exactly one
    // capture attempt.
    let target = temp.path().join("inbox/idea.md");
    std::fs::write(&target, "Draft a postmortem outline").unwrap();
    std::fs::write(&target, "Draft a postmortem outline").unwrap();

    let report = next_report(&mut reports).await;
    assert_eq!(report.path.file_name(), target.file_name());
    assert!(matches!(report.outcome, WatchOutcome::Created { .. }), "got {report:?}");

    // No second attempt for the coalesced writes.
    assert!(timeout(QUIET_TIMEOUT, reports.recv()).await.is_err());
    assert_eq!(store.count().unwrap(), 1);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_watch_honors_configured_hints() {
    let temp = TempDir::new().unwrap();
    let (capture, store, config) = stack(&temp, |config| {
        config.watch.category = Some("inbox".to_string());
        config.watch.tags = vec!["watched".to_string()];
    });

    let handle = start_watch(Arc::clone(&capture), config.watch.clone()).unwrap();
    let mut states = handle.state_stream();
    wait_for_state(&mut states, WatchState::Watching).await;
    let mut reports = handle.subscribe();

    std::fs::write(temp.path().join("inbox/task.md"), "Plan the sprint retro agenda").unwrap();

    let report = next_report(&mut reports).await;
    let WatchOutcome::Created { prompt_id } = report.outcome else {
        panic!("expected Created, got {report:?}");
    };

    let prompt = store.get(&prompt_id).unwrap();
    assert_eq!(prompt.category.as_deref(), Some("inbox"));
    assert!(prompt.tags.contains(&"watched".to_string()));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_non_matching_extensions_are_ignored() {
    let temp = TempDir::new().unwrap();
    let (capture, store, config) = stack(&temp, |_| {});

    let handle = start_watch(Arc::clone(&capture), config.watch.clone()).unwrap();
    let mut states = handle.state_stream();
    wait_for_state(&mut states, WatchState::Watching).await;
    let mut reports = handle.subscribe();

    std::fs::write(temp.path().join("inbox/binary.exe"), "not a prompt").unwrap();

    assert!(timeout(QUIET_TIMEOUT, reports.recv()).await.is_err());
    assert_eq!(store.count().unwrap(), 0);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_capture_failures_are_reported_not_swallowed() {
    let temp = TempDir::new().unwrap();
    let (capture, store, config) = stack(&temp, |_| {});

    let handle = start_watch(Arc::clone(&capture), config.watch.clone()).unwrap();
    let mut states = handle.state_stream();
    wait_for_state(&mut states, WatchState::Watching).await;
    let mut reports = handle.subscribe();

    // A watched extension with undecodable bytes: the failure must reach
    // the observer with the path attached.
    std::fs::write(temp.path().join("inbox/broken.md"), [0xff, 0xfe, 0x9f]).unwrap();

    let report = next_report(&mut reports).await;
    assert_eq!(report.path.file_name().and_then(|n| n.to_str()), Some("broken.md"));
    assert!(matches!(report.outcome, WatchOutcome::Failed { .. }), "got {report:?}");

    // The loop survives the failure and keeps capturing.
    std::fs::write(temp.path().join("inbox/fine.md"), "A healthy prompt").unwrap();
    let report = next_report(&mut reports).await;
    assert!(matches!(report.outcome, WatchOutcome::Created { .. }));
    assert_eq!(store.count().unwrap(), 1);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_file_content_bumps_usage() {
    let temp = TempDir::new().unwrap();
    let (capture, store, config) = stack(&temp, |_| {});

    let handle = start_watch(Arc::clone(&capture), config.watch.clone()).unwrap();
    let mut states = handle.state_stream();
    wait_for_state(&mut states, WatchState::Watching).await;
    let mut reports = handle.subscribe();

    std::fs::write(temp.path().join("inbox/a.md"), "Exactly the same content").unwrap();
    let first = next_report(&mut reports).await;
    assert!(matches!(first.outcome, WatchOutcome::Created { .. }));

    // Same content under a different name is an exact duplicate.
    std::fs::write(temp.path().join("inbox/b.md"), "Exactly the same content").unwrap();
    let second = next_report(&mut reports).await;
    match second.outcome {
        WatchOutcome::Duplicate { usage_count, .. } => assert_eq!(usage_count, 2),
        other => panic!("expected Duplicate, got {other:?}"),
    }

    assert_eq!(store.count().unwrap(), 1);
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_cooperative_and_final() {
    let temp = TempDir::new().unwrap();
    let (capture, _store, config) = stack(&temp, |_| {});

    let handle = start_watch(Arc::clone(&capture), config.watch.clone()).unwrap();
    let mut states = handle.state_stream();
    wait_for_state(&mut states, WatchState::Watching).await;

    handle.stop().await.unwrap();
    assert_eq!(*states.borrow(), WatchState::Stopped);
}

#[tokio::test]
async fn test_missing_watch_root_fails_before_starting() {
    let temp = TempDir::new().unwrap();
    let (capture, _store, mut config) = stack(&temp, |_| {});
    config.watch.root = temp.path().join("missing").to_string_lossy().into_owned();

    let err = start_watch(capture, config.watch).unwrap_err();
    assert!(matches!(err, promptledger_service::ServiceError::Config(_)), "got {err:?}");
}
