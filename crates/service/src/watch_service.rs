//! File-system watch loop.
//!
//! A notify watcher feeds an mpsc channel; a tokio task coalesces events per
//! file inside the configured debounce window and drives the capture service
//! for each file that has gone quiet. The loop is cancellable at every
//! event-processing boundary and finishes in-flight work before stopping.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use promptledger_core::WatchConfig;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time;

use crate::capture_service::{CaptureHints, CaptureOutcome, CaptureService, CaptureSource};
use crate::error::ServiceError;

/// Watch loop state machine: Idle → Watching ⇄ Processing → Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Processing,
    Stopped,
}

/// Per-file capture outcome delivered to observers. Failures are reported,
/// never swallowed; the loop keeps running.
#[derive(Debug, Clone)]
pub enum WatchOutcome {
    Created { prompt_id: String },
    Duplicate { prompt_id: String, usage_count: u32 },
    NearDuplicate { candidate_id: String, similarity: f64 },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct WatchReport {
    pub path: PathBuf,
    pub outcome: WatchOutcome,
}

enum WatchCommand {
    Stop,
}

/// Handle to a running watch loop.
#[derive(Debug)]
pub struct WatchHandle {
    command_tx: mpsc::Sender<WatchCommand>,
    state_rx: watch::Receiver<WatchState>,
    report_tx: broadcast::Sender<WatchReport>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    pub fn state(&self) -> WatchState {
        *self.state_rx.borrow()
    }

    /// Live view of the state machine.
    pub fn state_stream(&self) -> watch::Receiver<WatchState> {
        self.state_rx.clone()
    }

    /// Subscribe to per-file capture reports.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchReport> {
        self.report_tx.subscribe()
    }

    /// Cooperative shutdown: pending files are flushed, any in-flight
    /// capture completes, then the task exits in the Stopped state.
    pub async fn stop(self) -> Result<(), ServiceError> {
        let _ = self.command_tx.send(WatchCommand::Stop).await;
        self.task
            .await
            .map_err(|e| ServiceError::Watch(format!("watch task failed: {e}")))
    }
}

/// Start watching the configured root and driving captures from change
/// events.
pub fn start_watch(
    capture: Arc<CaptureService>,
    config: WatchConfig,
) -> Result<WatchHandle, ServiceError> {
    config.validate()?;
    let root = config.resolved_root()?;

    let (event_tx, event_rx) = mpsc::channel(1024);
    let (command_tx, command_rx) = mpsc::channel(8);
    let (state_tx, state_rx) = watch::channel(WatchState::Idle);
    let (report_tx, _) = broadcast::channel(256);

    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(config.poll_interval),
    )
    .map_err(|e| ServiceError::Watch(format!("watcher init failed: {e}")))?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| ServiceError::Watch(format!("failed to watch {}: {e}", root.display())))?;

    tracing::info!(root = %root.display(), "watch loop starting");
    let task = tokio::spawn(run_loop(
        capture,
        config,
        watcher,
        event_rx,
        command_rx,
        state_tx,
        report_tx.clone(),
    ));

    Ok(WatchHandle { command_tx, state_rx, report_tx, task })
}

async fn run_loop(
    capture: Arc<CaptureService>,
    config: WatchConfig,
    _watcher: RecommendedWatcher,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    mut command_rx: mpsc::Receiver<WatchCommand>,
    state_tx: watch::Sender<WatchState>,
    report_tx: broadcast::Sender<WatchReport>,
) {
    let debounce = config.debounce;
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let _ = state_tx.send(WatchState::Watching);

    loop {
        let deadline = next_deadline(&pending, debounce);

        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(Ok(event)) => record_event(&config, &mut pending, event),
                    Some(Err(e)) => tracing::warn!(error = %e, "watcher backend error"),
                    // Watcher gone; nothing more will arrive.
                    None => break,
                }
            }
            _ = command_rx.recv() => {
                // Stop command (or handle dropped): flush pending work, then
                // shut down without abandoning accepted files.
                let due: Vec<PathBuf> = pending.drain().map(|(path, _)| path).collect();
                if !due.is_empty() {
                    process_batch(&capture, &config, due, &state_tx, &report_tx).await;
                }
                break;
            }
            _ = sleep_until_std(deadline), if deadline.is_some() => {
                let due = take_due(&mut pending, debounce, Instant::now());
                if !due.is_empty() {
                    process_batch(&capture, &config, due, &state_tx, &report_tx).await;
                }
            }
        }
    }

    let _ = state_tx.send(WatchState::Stopped);
    tracing::info!("watch loop stopped");
}

async fn sleep_until_std(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        time::sleep_until(time::Instant::from_std(deadline)).await;
    }
}

fn record_event(config: &WatchConfig, pending: &mut HashMap<PathBuf, Instant>, event: Event) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in event.paths {
        if config.matches_extension(&path) {
            // Repeated events for one file within the window coalesce into a
            // single pending entry; the timestamp restart extends the quiet
            // period.
            pending.insert(path, Instant::now());
        }
    }
}

/// Deadline at which the earliest pending file becomes due.
fn next_deadline(pending: &HashMap<PathBuf, Instant>, debounce: Duration) -> Option<Instant> {
    pending.values().min().map(|earliest| *earliest + debounce)
}

/// Remove and return every file whose debounce window has elapsed.
fn take_due(
    pending: &mut HashMap<PathBuf, Instant>,
    debounce: Duration,
    now: Instant,
) -> Vec<PathBuf> {
    let due: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, last_event)| now.duration_since(**last_event) >= debounce)
        .map(|(path, _)| path.clone())
        .collect();
    for path in &due {
        pending.remove(path);
    }
    due
}

async fn process_batch(
    capture: &Arc<CaptureService>,
    config: &WatchConfig,
    due: Vec<PathBuf>,
    state_tx: &watch::Sender<WatchState>,
    report_tx: &broadcast::Sender<WatchReport>,
) {
    let _ = state_tx.send(WatchState::Processing);

    for path in due {
        // Watch-configured hints are honored exactly like manual ones.
        let hints = CaptureHints {
            category: config.category.clone(),
            tags: config.tags.clone(),
            ..CaptureHints::default()
        };

        let service = Arc::clone(capture);
        let target = path.clone();
        let result =
            tokio::task::spawn_blocking(move || service.capture(CaptureSource::File(target), hints))
                .await;

        let outcome = match result {
            Ok(Ok(CaptureOutcome::Created(prompt))) => {
                tracing::info!(path = %path.display(), prompt_id = %prompt.id, "watched file captured");
                WatchOutcome::Created { prompt_id: prompt.id }
            }
            Ok(Ok(CaptureOutcome::Duplicate(prompt))) => WatchOutcome::Duplicate {
                prompt_id: prompt.id,
                usage_count: prompt.metrics.usage_count,
            },
            Ok(Ok(CaptureOutcome::NearDuplicate { candidate_id, similarity })) => {
                WatchOutcome::NearDuplicate { candidate_id, similarity }
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "watched capture failed");
                WatchOutcome::Failed { reason: e.to_string() }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "capture task failed");
                WatchOutcome::Failed { reason: format!("capture task failed: {e}") }
            }
        };

        let _ = report_tx.send(WatchReport { path, outcome });
    }

    let _ = state_tx.send(WatchState::Watching);
}
