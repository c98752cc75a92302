//! Sequential track download pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Record;
use crate::error::{FileSystemError, Result};
use crate::fetch::{AUDIO_EXTENSION, AudioFetcher};

/// One successfully downloaded track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedTrack {
    /// Staged audio file path.
    pub path: PathBuf,
    /// The record the file was fetched for.
    pub record: Record,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct DownloadOutcome {
    /// Successfully downloaded tracks, ordered as their records were.
    pub tracks: Vec<DownloadedTrack>,
    /// Number of records the pipeline attempted before stopping.
    pub attempted: usize,
    /// Number of attempted records whose download failed.
    pub failed: usize,
    /// Whether the run stopped early because cancellation was observed.
    pub was_cancelled: bool,
}

impl DownloadOutcome {
    /// True when no track was downloaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Get a summary of the pipeline outcome.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.was_cancelled {
            format!(
                "Download cancelled: {} track(s) downloaded before cancellation",
                self.tracks.len()
            )
        } else {
            format!(
                "Download completed: {} downloaded, {} failed of {} attempted",
                self.tracks.len(),
                self.failed,
                self.attempted
            )
        }
    }
}

/// Sequential, cancellable download pipeline.
///
/// Records are processed strictly one at a time. The cancellation flag is
/// polled before each item only; an in-flight download finishes or fails
/// naturally before the next boundary check.
#[derive(Debug)]
pub struct DownloadPipeline {
    staging_dir: PathBuf,
    cancel_flag: Arc<AtomicBool>,
}

impl DownloadPipeline {
    /// Create a pipeline staging files into `staging_dir`.
    #[must_use]
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self::with_cancellation(staging_dir, Arc::new(AtomicBool::new(false)))
    }

    /// Create a pipeline observing an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancellation(
        staging_dir: impl Into<PathBuf>,
        cancel_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            cancel_flag,
        }
    }

    /// Get the cancel flag for external cancellation control.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Request a stop at the next item boundary.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// Run the pipeline over `records`.
    ///
    /// `on_progress(completed, total)` is invoked exactly once per attempted
    /// item, synchronously after its success or failure, with `completed`
    /// counting contiguously from 1. Per-item failures are logged and
    /// skipped. Cancellation truncates the run and is reported through the
    /// outcome, not as an error.
    pub async fn run<F>(
        &self,
        fetcher: &dyn AudioFetcher,
        records: &[Record],
        on_progress: Option<F>,
    ) -> Result<DownloadOutcome>
    where
        F: Fn(usize, usize),
    {
        let total = records.len();
        let mut outcome = DownloadOutcome::default();

        std::fs::create_dir_all(&self.staging_dir).map_err(|e| {
            FileSystemError::CreateDirFailed {
                path: self.staging_dir.clone(),
                reason: format!("Failed to create staging directory: {e}"),
            }
        })?;

        info!("Starting download of {} track(s)", total);

        for (index, record) in records.iter().enumerate() {
            if self.cancel_flag.load(Ordering::SeqCst) {
                info!(
                    "Cancellation observed before item {} of {}",
                    index + 1,
                    total
                );
                outcome.was_cancelled = true;
                break;
            }

            let destination = self
                .staging_dir
                .join(format!("{}.{AUDIO_EXTENSION}", Uuid::new_v4()));

            outcome.attempted += 1;
            match fetcher.fetch_audio(&record.external_id, &destination).await {
                Ok(()) => {
                    debug!("Downloaded '{}' to {}", record.title, destination.display());
                    outcome.tracks.push(DownloadedTrack {
                        path: destination,
                        record: record.clone(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Skipping '{}' ({}): {}",
                        record.title, record.external_id, e
                    );
                    outcome.failed += 1;
                }
            }

            if let Some(callback) = &on_progress {
                callback(index + 1, total);
            }
        }

        info!("{}", outcome.summary());
        Ok(outcome)
    }
}
