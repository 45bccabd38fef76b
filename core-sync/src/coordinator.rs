//! # Run Coordinator
//!
//! Serializes scan and sync runs and owns the run-state machine:
//!
//! ```text
//! Idle -> Running(kind) -> Completed(kind) | Failed(kind)
//! ```
//!
//! Exactly one run may be `Running` at a time; a start request while one is
//! active is rejected synchronously with `ConcurrentRun` and never queued.
//! Start calls return a run identifier immediately; outcome is observable
//! through the event stream and the final catalog state.
//!
//! Run-level failures surface as one terminal error status event plus a log
//! line; no error crosses the coordinator boundary to the caller of a
//! start method once the run is under way.

use crate::adapters::{create_adapter, TransferStats};
use crate::error::{Result, SyncError};
use crate::planner::build_plan;
use crate::playlist::{materialize_playlists, PlaylistInput};
use crate::scanner::{ScanStats, Scanner};
use core_catalog::CatalogStore;
use core_metadata::TagReader;
use core_runtime::config::{ScanSettings, SettingsStore, SyncSettings};
use core_runtime::events::{EventBus, RunOutcome};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Scan,
    Sync,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Scan => write!(f, "scan"),
            RunKind::Sync => write!(f, "sync"),
        }
    }
}

/// Coordinator-owned run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(RunKind),
    Completed(RunKind),
    Failed(RunKind),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running(_))
    }
}

/// Opaque identifier for one run, usable to correlate log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunId(Uuid);

impl RunId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry point for triggering runs. Cheap to clone via the contained Arcs.
pub struct RunCoordinator {
    catalog: Arc<dyn CatalogStore>,
    settings: Arc<dyn SettingsStore>,
    tags: Arc<dyn TagReader>,
    events: EventBus,
    state: Arc<Mutex<RunState>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    run_timeout: Option<Duration>,
}

impl RunCoordinator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        settings: Arc<dyn SettingsStore>,
        tags: Arc<dyn TagReader>,
        events: EventBus,
    ) -> Self {
        Self {
            catalog,
            settings,
            tags,
            events,
            state: Arc::new(Mutex::new(RunState::Idle)),
            cancel: Arc::new(Mutex::new(None)),
            run_timeout: None,
        }
    }

    /// Bound the total duration of any single run.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The shared event stream for this coordinator.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Cancel the active run, if any. The run transitions to `Failed` once
    /// the active adapter or scanner observes the token.
    pub fn cancel(&self) {
        let guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = guard.as_ref() {
            token.cancel();
        }
    }

    /// Start a scan run. Returns as soon as the run is admitted.
    ///
    /// # Errors
    ///
    /// `Configuration` when scan settings are missing or malformed (no state
    /// change), `ConcurrentRun` when another run is active.
    pub async fn start_scan(&self) -> Result<RunId> {
        let settings = ScanSettings::load(self.settings.as_ref()).await?;
        let cancel = self.try_begin(RunKind::Scan)?;
        let run_id = RunId::new();

        let scanner = Scanner::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.tags),
            self.events.clone(),
        );
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let timeout = self.run_timeout;

        tokio::spawn(async move {
            events.status(RunOutcome::Started);
            info!(%run_id, "Scan run started");

            let result = with_deadline(timeout, cancellable(cancel, scanner.run_scan(&settings))).await;
            finish(&state, &events, RunKind::Scan, run_id, result.map(describe_scan));
        });

        Ok(run_id)
    }

    /// Start a sync run pushing the flagged catalog rows plus the given
    /// playlists. Returns as soon as the run is admitted.
    ///
    /// # Errors
    ///
    /// `Configuration` when sync settings are missing or malformed (no state
    /// change), `ConcurrentRun` when another run is active.
    pub async fn start_sync(&self, playlists: Vec<PlaylistInput>) -> Result<RunId> {
        let settings = SyncSettings::load(self.settings.as_ref()).await?;
        let cancel = self.try_begin(RunKind::Sync)?;
        let run_id = RunId::new();

        let catalog = Arc::clone(&self.catalog);
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let timeout = self.run_timeout;

        tokio::spawn(async move {
            events.status(RunOutcome::Started);
            info!(%run_id, mode = %settings.mode, "Sync run started");

            // The sync body observes the token itself (adapters check it
            // between files and inside long invocations), so the session is
            // released through `finalize` before the run finishes.
            let result = with_deadline(
                timeout,
                run_sync(catalog, settings, playlists, events.clone(), cancel),
            )
            .await;
            finish(&state, &events, RunKind::Sync, run_id, result.map(describe_sync));
        });

        Ok(run_id)
    }

    /// Admit a run, or reject it synchronously when one is active.
    fn try_begin(&self, kind: RunKind) -> Result<CancellationToken> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_running() {
            return Err(SyncError::ConcurrentRun);
        }
        *state = RunState::Running(kind);

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        Ok(token)
    }
}

/// Race a run body against its cancellation token. Only used for scan
/// runs: dropping a scan mid-file is safe because every row is committed
/// independently and there is no session to release.
async fn cancellable<T>(
    cancel: CancellationToken,
    body: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        result = body => result,
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
    }
}

/// Apply the optional overall run deadline.
async fn with_deadline<T>(
    timeout: Option<Duration>,
    body: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, body)
            .await
            .unwrap_or_else(|_| Err(SyncError::Timeout(limit.as_secs()))),
        None => body.await,
    }
}

/// Record the terminal state and emit the terminal events.
fn finish(
    state: &Mutex<RunState>,
    events: &EventBus,
    kind: RunKind,
    run_id: RunId,
    result: Result<String>,
) {
    match result {
        Ok(summary) => {
            *state.lock().unwrap_or_else(|e| e.into_inner()) = RunState::Completed(kind);
            info!(%run_id, "{} run completed: {}", kind, summary);
            events.log(summary);
            events.status(RunOutcome::Completed);
        }
        Err(e) => {
            *state.lock().unwrap_or_else(|e| e.into_inner()) = RunState::Failed(kind);
            error!(%run_id, "{} run failed: {}", kind, e);
            events.log(format!("{} failed: {}", kind, e));
            events.status(RunOutcome::Error);
        }
    }
}

fn describe_scan(stats: ScanStats) -> String {
    format!(
        "Scan complete: {} added, {} updated, {} missing",
        stats.added, stats.updated, stats.missing
    )
}

fn describe_sync(stats: TransferStats) -> String {
    format!(
        "Sync complete: {} sent, {} failed, {} skipped",
        stats.sent, stats.failed, stats.skipped
    )
}

/// Body of one sync run: plan, stage playlists, connect, transfer, release.
async fn run_sync(
    catalog: Arc<dyn CatalogStore>,
    settings: SyncSettings,
    playlists: Vec<PlaylistInput>,
    events: EventBus,
    cancel: CancellationToken,
) -> Result<TransferStats> {
    let rows = catalog.query_sync_candidates().await?;
    let mut plan = build_plan(&rows, &settings.dest_root);

    // The staging directory must outlive the transfer.
    let stage = tempfile::tempdir()?;
    if !playlists.is_empty() {
        let generated = materialize_playlists(&playlists, stage.path(), &settings.dest_root)?;
        events.log(format!("Rendered {} playlists", generated.len()));
        plan.extend(generated);
    }

    if plan.is_empty() {
        events.log("Nothing selected for sync");
        return Ok(TransferStats::default());
    }
    events.log(format!("Transfer plan: {} files", plan.len()));

    let mut adapter = create_adapter(&settings)?;
    adapter.connect().await?;

    let transferred = adapter.transfer(&plan, &events, &cancel).await;
    // The session is released even when the transfer failed mid-run.
    let _ = adapter.finalize().await;
    transferred
}
