//! Rip orchestrator coordinating one playlist run end to end.
//!
//! A run moves through: resolve the playlist name, list its items, export
//! the track list, wait for a go/no-go decision, download each track, and
//! merge the downloads into one file. The orchestrator owns the run's
//! cancellation flag and emits immutable [`RipEvent`] snapshots over a
//! channel; subscribers never mutate run state directly.
//!
//! Each `start` spawns exactly one background worker task that performs the
//! whole run, including the catalog calls and the confirmation wait. Only
//! one run may be active per orchestrator instance.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::{CatalogClient, PlaylistRef};
use crate::download::DownloadPipeline;
use crate::error::{Error, Result};
use crate::export::ManifestExporter;
use crate::fetch::AudioFetcher;
use crate::merge::{Concatenator, Merger, discard_tracks};

// =============================================================================
// Rip Phase Definitions
// =============================================================================

/// Current phase of a rip run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RipPhase {
    /// No run is active.
    Idle,
    /// Resolving the playlist name.
    Resolving,
    /// Listing the playlist items.
    Listing,
    /// Waiting for the go/no-go decision.
    AwaitingConfirmation,
    /// Downloading tracks one at a time.
    Downloading,
    /// Concatenating downloaded tracks.
    Merging,
    /// Run finished.
    Done,
    /// Run failed.
    Failed,
    /// Run was cancelled while downloading.
    Cancelled,
}

impl std::fmt::Display for RipPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Resolving => write!(f, "Resolving"),
            Self::Listing => write!(f, "Listing"),
            Self::AwaitingConfirmation => write!(f, "AwaitingConfirmation"),
            Self::Downloading => write!(f, "Downloading"),
            Self::Merging => write!(f, "Merging"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

// =============================================================================
// Rip Request
// =============================================================================

/// Request to rip one playlist into a single audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RipRequest {
    /// The playlist to rip.
    pub reference: PlaylistRef,
}

impl RipRequest {
    /// Create a new rip request.
    #[must_use]
    pub const fn new(reference: PlaylistRef) -> Self {
        Self { reference }
    }
}

// =============================================================================
// Rip Events
// =============================================================================

/// Event types emitted during a rip run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RipEvent {
    /// The run moved to a new phase.
    PhaseChanged {
        /// The phase just entered.
        phase: RipPhase,
    },
    /// The track list was retrieved and exported.
    TracklistReady {
        /// Resolved playlist name.
        playlist_name: String,
        /// Number of usable records.
        total: usize,
        /// Path of the exported track list.
        export_path: PathBuf,
    },
    /// One more item finished downloading, successfully or not.
    Progress {
        /// Items processed so far.
        completed: usize,
        /// Total items in this run.
        total: usize,
    },
    /// The run reached a terminal phase.
    Finished {
        /// Final run result.
        result: RipResult,
    },
}

// =============================================================================
// Rip Result
// =============================================================================

/// Result of a rip run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RipResult {
    /// Whether the run ended without cancellation or error.
    pub success: bool,

    /// Whether the run was cancelled while downloading.
    pub was_cancelled: bool,

    /// Final phase reached.
    pub final_phase: RipPhase,

    /// Resolved playlist name, when resolution succeeded.
    pub playlist_name: Option<String>,

    /// Number of records listed from the catalog.
    pub total_records: usize,

    /// Number of tracks downloaded.
    pub tracks_downloaded: usize,

    /// Number of download attempts that failed.
    pub tracks_failed: usize,

    /// Path of the merged output file, when the merge ran and succeeded.
    pub output_path: Option<PathBuf>,

    /// Path of the exported track list.
    pub export_path: Option<PathBuf>,

    /// Total duration of the run.
    pub duration_secs: f64,

    /// Error message if the run failed.
    pub error_message: Option<String>,
}

impl RipResult {
    /// Create an empty result.
    fn empty() -> Self {
        Self {
            success: false,
            was_cancelled: false,
            final_phase: RipPhase::Resolving,
            playlist_name: None,
            total_records: 0,
            tracks_downloaded: 0,
            tracks_failed: 0,
            output_path: None,
            export_path: None,
            duration_secs: 0.0,
            error_message: None,
        }
    }

    /// Finalize the result.
    fn finalize(&mut self, duration_secs: f64) {
        self.duration_secs = duration_secs;
        self.success = self.error_message.is_none() && !self.was_cancelled;
    }

    /// Get a summary of the run result.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.was_cancelled {
            format!(
                "Rip cancelled: {} track(s) downloaded before cancellation",
                self.tracks_downloaded
            )
        } else if let Some(ref error) = self.error_message {
            format!("Rip failed: {error}")
        } else if let Some(ref output) = self.output_path {
            format!(
                "Rip completed: {} of {} track(s) merged into {} in {:.2}s",
                self.tracks_downloaded,
                self.total_records,
                output.display(),
                self.duration_secs
            )
        } else {
            format!(
                "Rip finished without download: {} record(s) exported",
                self.total_records
            )
        }
    }
}

// =============================================================================
// Rip Orchestrator
// =============================================================================

/// Orchestrator for rip runs.
///
/// Phase graph: `Idle -> Resolving -> Listing -> AwaitingConfirmation ->
/// Downloading -> Merging -> Done`, with `Cancelled` reachable only from
/// `Downloading` and `Failed` from `Resolving`, `Listing`, or `Merging`.
/// Declining the confirmation ends the run in `Done` with the exported
/// track list kept. The orchestrator returns to `Idle` before a new
/// `start` is accepted.
pub struct RipOrchestrator {
    catalog: Arc<dyn CatalogClient>,
    fetcher: Arc<dyn AudioFetcher>,
    concatenator: Arc<dyn Concatenator>,
    staging_dir: PathBuf,
    output_dir: PathBuf,
    /// Single in-flight run guard.
    running: Arc<AtomicBool>,
    /// Cancellation flag shared with the download pipeline.
    cancelled: Arc<AtomicBool>,
    /// Current phase, `Idle` between runs.
    phase: Arc<RwLock<RipPhase>>,
    /// Armed while a run waits in `AwaitingConfirmation`.
    confirm_tx: Arc<Mutex<Option<oneshot::Sender<bool>>>>,
    /// Channel for sending run events.
    event_tx: mpsc::UnboundedSender<RipEvent>,
    /// Channel for receiving run events.
    event_rx: Arc<RwLock<mpsc::UnboundedReceiver<RipEvent>>>,
}

impl RipOrchestrator {
    /// Create an orchestrator around the given collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        fetcher: Arc<dyn AudioFetcher>,
        concatenator: Arc<dyn Concatenator>,
        staging_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            catalog,
            fetcher,
            concatenator,
            staging_dir: staging_dir.into(),
            output_dir: output_dir.into(),
            running: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(RwLock::new(RipPhase::Idle)),
            confirm_tx: Arc::new(Mutex::new(None)),
            event_tx,
            event_rx: Arc::new(RwLock::new(event_rx)),
        }
    }

    /// Start a run for `request`.
    ///
    /// Spawns the run's single background worker and returns its join
    /// handle. The handle resolves to the authoritative [`RipResult`]; the
    /// same value is also emitted as [`RipEvent::Finished`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunInProgress`] while another run is active.
    pub fn start(&self, request: RipRequest) -> Result<JoinHandle<RipResult>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::RunInProgress);
        }

        self.cancelled.store(false, Ordering::SeqCst);

        let worker = RunWorker {
            catalog: Arc::clone(&self.catalog),
            fetcher: Arc::clone(&self.fetcher),
            concatenator: Arc::clone(&self.concatenator),
            staging_dir: self.staging_dir.clone(),
            output_dir: self.output_dir.clone(),
            running: Arc::clone(&self.running),
            cancelled: Arc::clone(&self.cancelled),
            phase: Arc::clone(&self.phase),
            confirm_tx: Arc::clone(&self.confirm_tx),
            event_tx: self.event_tx.clone(),
        };

        info!("Starting rip run for playlist {}", request.reference);
        Ok(tokio::spawn(worker.run(request)))
    }

    /// Deliver the go/no-go decision for a run awaiting confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPendingConfirmation`] when no run is waiting.
    pub async fn confirm(&self, proceed: bool) -> Result<()> {
        match self.confirm_tx.lock().await.take() {
            Some(tx) => {
                info!(
                    "Confirmation received: {}",
                    if proceed { "proceed" } else { "decline" }
                );
                let _ = tx.send(proceed);
                Ok(())
            }
            None => Err(Error::NoPendingConfirmation),
        }
    }

    /// Request cancellation of the active run.
    ///
    /// The flag is polled at per-item boundaries inside the download phase;
    /// an in-flight item download finishes or fails naturally first, and
    /// cancellation requested during earlier phases takes effect at the
    /// first boundary check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Get a cancellation token that can be shared across tasks.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// True while a run is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current phase, [`RipPhase::Idle`] when no run is active.
    pub async fn phase(&self) -> RipPhase {
        *self.phase.read().await
    }

    /// Try to receive a run event without blocking.
    pub async fn try_recv_event(&self) -> Option<RipEvent> {
        let mut rx = self.event_rx.write().await;
        rx.try_recv().ok()
    }
}

impl std::fmt::Debug for RipOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RipOrchestrator")
            .field("staging_dir", &self.staging_dir)
            .field("output_dir", &self.output_dir)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Run Worker
// =============================================================================

/// State moved into the per-run background task.
struct RunWorker {
    catalog: Arc<dyn CatalogClient>,
    fetcher: Arc<dyn AudioFetcher>,
    concatenator: Arc<dyn Concatenator>,
    staging_dir: PathBuf,
    output_dir: PathBuf,
    running: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    phase: Arc<RwLock<RipPhase>>,
    confirm_tx: Arc<Mutex<Option<oneshot::Sender<bool>>>>,
    event_tx: mpsc::UnboundedSender<RipEvent>,
}

impl RunWorker {
    #[allow(clippy::too_many_lines)]
    async fn run(self, request: RipRequest) -> RipResult {
        let started = Instant::now();
        let mut result = RipResult::empty();

        // ---------------------------------------------------------------------
        // Resolve the playlist name
        // ---------------------------------------------------------------------
        self.set_phase(&mut result, RipPhase::Resolving).await;

        let playlist_name = match self.catalog.resolve_name(&request.reference).await {
            Ok(name) => name,
            Err(e) => {
                error!("Failed to resolve playlist {}: {}", request.reference, e);
                return self.fail(result, started, &e).await;
            }
        };
        info!(
            "Resolved playlist {} as '{}'",
            request.reference, playlist_name
        );
        result.playlist_name = Some(playlist_name.clone());

        // ---------------------------------------------------------------------
        // List the playlist items
        // ---------------------------------------------------------------------
        self.set_phase(&mut result, RipPhase::Listing).await;

        let records = match self.catalog.list_items(&request.reference).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    "Failed to list items for playlist {}: {}",
                    request.reference, e
                );
                return self.fail(result, started, &e).await;
            }
        };
        result.total_records = records.len();

        // The track list is exported before confirmation; it is kept even
        // when the user declines the download.
        let exporter = ManifestExporter::new(&self.output_dir);
        let export_path = match exporter.write(&playlist_name, &records) {
            Ok(path) => path,
            Err(e) => {
                error!("Failed to export track list: {}", e);
                return self.fail(result, started, &e).await;
            }
        };
        result.export_path = Some(export_path.clone());

        // ---------------------------------------------------------------------
        // Await the go/no-go decision
        // ---------------------------------------------------------------------
        self.set_phase(&mut result, RipPhase::AwaitingConfirmation)
            .await;

        let (tx, rx) = oneshot::channel();
        *self.confirm_tx.lock().await = Some(tx);
        let _ = self.event_tx.send(RipEvent::TracklistReady {
            playlist_name: playlist_name.clone(),
            total: records.len(),
            export_path,
        });

        // A dropped sender counts as a decline
        let proceed = rx.await.unwrap_or(false);
        if !proceed {
            info!("Download declined; keeping the exported track list only");
            return self.finish(result, started, RipPhase::Done).await;
        }

        // ---------------------------------------------------------------------
        // Download each track
        // ---------------------------------------------------------------------
        self.set_phase(&mut result, RipPhase::Downloading).await;

        let pipeline =
            DownloadPipeline::with_cancellation(&self.staging_dir, Arc::clone(&self.cancelled));
        let event_tx = self.event_tx.clone();
        let on_progress = move |completed: usize, total: usize| {
            let _ = event_tx.send(RipEvent::Progress { completed, total });
        };

        let outcome = match pipeline
            .run(self.fetcher.as_ref(), &records, Some(on_progress))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Download pipeline failed: {}", e);
                return self.fail(result, started, &e).await;
            }
        };
        result.tracks_downloaded = outcome.tracks.len();
        result.tracks_failed = outcome.failed;

        if outcome.was_cancelled {
            warn!(
                "Run cancelled with {} track(s) downloaded",
                outcome.tracks.len()
            );
            discard_tracks(&outcome.tracks);
            result.was_cancelled = true;
            return self.finish(result, started, RipPhase::Cancelled).await;
        }

        // ---------------------------------------------------------------------
        // Merge into one file
        // ---------------------------------------------------------------------
        self.set_phase(&mut result, RipPhase::Merging).await;

        let merger = Merger::new(&self.output_dir);
        match merger
            .merge(self.concatenator.as_ref(), &playlist_name, &outcome.tracks)
            .await
        {
            Ok(output_path) => {
                result.output_path = Some(output_path);
                self.finish(result, started, RipPhase::Done).await
            }
            Err(e) => {
                error!("Merge failed: {}", e);
                self.fail(result, started, &e).await
            }
        }
    }

    async fn set_phase(&self, result: &mut RipResult, phase: RipPhase) {
        result.final_phase = phase;
        *self.phase.write().await = phase;
        info!("Run phase: {}", phase);
        let _ = self.event_tx.send(RipEvent::PhaseChanged { phase });
    }

    async fn fail(&self, mut result: RipResult, started: Instant, error: &Error) -> RipResult {
        result.error_message = Some(error.to_string());
        self.finish(result, started, RipPhase::Failed).await
    }

    async fn finish(&self, mut result: RipResult, started: Instant, phase: RipPhase) -> RipResult {
        self.set_phase(&mut result, phase).await;
        result.finalize(started.elapsed().as_secs_f64());
        info!("{}", result.summary());

        // Back to Idle before the next start is allowed
        *self.phase.write().await = RipPhase::Idle;
        self.running.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(RipEvent::Finished {
            result: result.clone(),
        });
        result
    }
}
