//! Integration tests for Mixtape core workflows.
//!
//! These tests verify end-to-end workflows including:
//! - Resolving and listing a playlist catalog (using fake catalog clients)
//! - Track list export
//! - Download, cancellation, and merge runs driven by the orchestrator
//!
//! All tests use temporary directories as fixtures and fake tool
//! implementations in place of the real yt-dlp and ffmpeg binaries.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mixtape_core::error::{CatalogError, FetchError, MergeError};
use mixtape_core::{
    // Config
    AppConfig,
    // Fetch
    AudioFetcher,
    // Catalog
    CatalogClient,
    // Merge
    Concatenator,
    // Error types
    Error,
    PlaylistRef,
    Record,
    Result,
    // Rip
    RipEvent,
    RipOrchestrator,
    RipPhase,
    RipRequest,
};
use tempfile::TempDir;

// =============================================================================
// Test Fixtures and Utilities
// =============================================================================

/// Test fixture providing temporary staging and output directories.
struct TestFixture {
    /// Directory where per-track downloads are staged.
    staging_dir: TempDir,
    /// Directory where track lists and merged files land.
    output_dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with empty directories.
    fn new() -> Result<Self> {
        let staging_dir = TempDir::new()
            .map_err(|e| Error::Configuration(format!("Failed to create staging dir: {e}")))?;
        let output_dir = TempDir::new()
            .map_err(|e| Error::Configuration(format!("Failed to create output dir: {e}")))?;

        Ok(Self {
            staging_dir,
            output_dir,
        })
    }

    /// Get the path to the staging directory.
    fn staging_path(&self) -> &Path {
        self.staging_dir.path()
    }

    /// Get the path to the output directory.
    fn output_path(&self) -> &Path {
        self.output_dir.path()
    }

    /// Build an orchestrator around the given fake collaborators.
    fn orchestrator(
        &self,
        catalog: FakeCatalog,
        fetcher: FakeFetcher,
        concatenator: impl Concatenator + 'static,
    ) -> RipOrchestrator {
        RipOrchestrator::new(
            Arc::new(catalog),
            Arc::new(fetcher),
            Arc::new(concatenator),
            self.staging_path().to_path_buf(),
            self.output_path().to_path_buf(),
        )
    }

    /// Get the sorted names of files currently in the output directory.
    fn list_output_files(&self) -> Vec<String> {
        let mut files: Vec<String> = fs::read_dir(self.output_path())
            .expect("read output dir")
            .map(|entry| {
                entry
                    .expect("read entry")
                    .file_name()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        files.sort();
        files
    }

    /// Count the files currently staged.
    fn staged_file_count(&self) -> usize {
        fs::read_dir(self.staging_path())
            .map_or(0, |entries| entries.count())
    }
}

/// Build a record with a fixed uploader.
fn record(title: &str, id: &str) -> Record {
    Record {
        title: title.to_string(),
        uploader: "Artist".to_string(),
        external_id: id.to_string(),
    }
}

/// Fake catalog client returning canned data.
struct FakeCatalog {
    name: String,
    records: Vec<Record>,
    fail_listing: bool,
}

impl FakeCatalog {
    fn new(name: &str, records: Vec<Record>) -> Self {
        Self {
            name: name.to_string(),
            records,
            fail_listing: false,
        }
    }

    fn failing_listing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Vec::new(),
            fail_listing: true,
        }
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn resolve_name(&self, _reference: &PlaylistRef) -> Result<String> {
        Ok(self.name.clone())
    }

    async fn list_items(&self, _reference: &PlaylistRef) -> Result<Vec<Record>> {
        if self.fail_listing {
            return Err(CatalogError::RequestFailed {
                reason: "connection reset by peer".to_string(),
            }
            .into());
        }
        Ok(self.records.clone())
    }
}

/// Fake fetcher that writes a recognizable payload per external id.
///
/// Payloads are deterministic so the merged output can be checked for
/// content and ordering.
struct FakeFetcher {
    fail_ids: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    fn new() -> Self {
        Self {
            fail_ids: HashSet::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing_for(ids: &[&str]) -> Self {
        Self {
            fail_ids: ids.iter().map(|id| (*id).to_string()).collect(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle on the call log, usable after the fetcher moves into the
    /// orchestrator.
    fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    fn payload(external_id: &str) -> String {
        format!("AUDIO:{external_id};")
    }
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
    async fn fetch_audio(&self, external_id: &str, destination: &Path) -> Result<()> {
        self.calls
            .lock()
            .expect("call log lock")
            .push(external_id.to_string());

        if self.fail_ids.contains(external_id) {
            return Err(FetchError::ToolFailed {
                external_id: external_id.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "video unavailable".to_string(),
            }
            .into());
        }

        fs::write(destination, Self::payload(external_id)).map_err(Error::Io)?;
        Ok(())
    }
}

/// Fake concatenator that actually concatenates the manifest's inputs.
///
/// Reads `file '...'` lines and appends each referenced file's bytes to the
/// output, which lets tests assert both content and order of the merge.
struct FakeConcatenator;

#[async_trait]
impl Concatenator for FakeConcatenator {
    async fn concat(&self, manifest_path: &Path, output_path: &Path) -> Result<()> {
        let manifest = fs::read_to_string(manifest_path).map_err(Error::Io)?;
        let mut merged = Vec::new();

        for line in manifest.lines() {
            let path = line
                .strip_prefix("file '")
                .and_then(|rest| rest.strip_suffix('\''))
                .ok_or_else(|| {
                    Error::Merge(MergeError::ConcatFailed {
                        status: "exit status: 1".to_string(),
                        stderr: format!("unparseable manifest line: {line}"),
                    })
                })?;
            let mut bytes = fs::read(path).map_err(Error::Io)?;
            merged.append(&mut bytes);
        }

        fs::write(output_path, merged).map_err(Error::Io)?;
        Ok(())
    }
}

/// Fake concatenator that always fails.
struct FailingConcatenator;

#[async_trait]
impl Concatenator for FailingConcatenator {
    async fn concat(&self, _manifest_path: &Path, _output_path: &Path) -> Result<()> {
        Err(MergeError::ConcatFailed {
            status: "exit status: 1".to_string(),
            stderr: "Invalid data found when processing input".to_string(),
        }
        .into())
    }
}

/// Wait until the orchestrator reaches `phase` or panic after a bound.
async fn wait_for_phase(orchestrator: &RipOrchestrator, phase: RipPhase) {
    for _ in 0..400 {
        if orchestrator.phase().await == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Timed out waiting for phase {phase}");
}

/// Drain all currently queued run events.
async fn drain_events(orchestrator: &RipOrchestrator) -> Vec<RipEvent> {
    let mut events = Vec::new();
    while let Some(event) = orchestrator.try_recv_event().await {
        events.push(event);
    }
    events
}

// =============================================================================
// Full Rip Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_full_rip_workflow() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::new(
        "Road Trip 2024",
        vec![
            record("First Song", "id-a"),
            record("Second Song", "id-b"),
            record("Third Song", "id-c"),
        ],
    );
    let fetcher = FakeFetcher::new();
    let call_log = fetcher.call_log();

    let orchestrator = fixture.orchestrator(catalog, fetcher, FakeConcatenator);
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start run");

    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;
    orchestrator.confirm(true).await.expect("Should confirm");

    let result = handle.await.expect("Worker should complete");
    assert!(result.success);
    assert_eq!(result.final_phase, RipPhase::Done);
    assert_eq!(result.playlist_name.as_deref(), Some("Road Trip 2024"));
    assert_eq!(result.total_records, 3);
    assert_eq!(result.tracks_downloaded, 3);
    assert_eq!(result.tracks_failed, 0);

    // Items were fetched one at a time in catalog order
    let calls = call_log.lock().expect("call log lock").clone();
    assert_eq!(calls, vec!["id-a", "id-b", "id-c"]);

    // The merged file carries the inputs' bytes in order
    let output_path = result.output_path.expect("merged output");
    assert_eq!(
        output_path,
        fixture.output_path().join("road_trip_2024.mp3")
    );
    let merged = fs::read_to_string(&output_path).expect("read merged output");
    assert_eq!(merged, "AUDIO:id-a;AUDIO:id-b;AUDIO:id-c;");

    // Staging inputs and the merge manifest are gone, export remains
    assert_eq!(fixture.staged_file_count(), 0);
    assert_eq!(
        fixture.list_output_files(),
        vec!["road_trip_2024.mp3", "road_trip_2024.txt"]
    );
}

#[tokio::test]
async fn test_rip_skips_failed_downloads() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::new(
        "Mostly Working",
        vec![
            record("Good One", "id-a"),
            record("Broken One", "id-b"),
            record("Good Two", "id-c"),
        ],
    );
    let fetcher = FakeFetcher::failing_for(&["id-b"]);

    let orchestrator = fixture.orchestrator(catalog, fetcher, FakeConcatenator);
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start run");

    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;
    orchestrator.confirm(true).await.expect("Should confirm");

    let result = handle.await.expect("Worker should complete");
    assert!(result.success);
    assert_eq!(result.tracks_downloaded, 2);
    assert_eq!(result.tracks_failed, 1);

    // The failed item is absent from the merged output, order kept
    let output_path = result.output_path.expect("merged output");
    let merged = fs::read_to_string(output_path).expect("read merged output");
    assert_eq!(merged, "AUDIO:id-a;AUDIO:id-c;");

    // Progress still advanced once per attempted item
    let events = drain_events(&orchestrator).await;
    let progress: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|event| match event {
            RipEvent::Progress { completed, total } => Some((*completed, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
}

#[tokio::test]
async fn test_decline_keeps_track_list_only() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::new("Careful Now", vec![record("Only Song", "id-a")]);
    let fetcher = FakeFetcher::new();
    let call_log = fetcher.call_log();

    let orchestrator = fixture.orchestrator(catalog, fetcher, FakeConcatenator);
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start run");

    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;
    orchestrator.confirm(false).await.expect("Should decline");

    let result = handle.await.expect("Worker should complete");
    assert!(result.success);
    assert_eq!(result.final_phase, RipPhase::Done);
    assert!(result.output_path.is_none());
    assert_eq!(result.tracks_downloaded, 0);

    // Nothing was fetched, only the exported track list exists
    assert!(call_log.lock().expect("call log lock").is_empty());
    assert_eq!(fixture.list_output_files(), vec!["careful_now.txt"]);

    let export = fs::read_to_string(fixture.output_path().join("careful_now.txt"))
        .expect("read export");
    assert_eq!(
        export,
        "Careful Now\n\nTitle: Only Song\nArtist: Artist\nVideo ID: id-a\n\n"
    );
}

#[tokio::test]
async fn test_listing_failure_fails_run_cleanly() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::failing_listing("Unreachable");
    let fetcher = FakeFetcher::new();
    let call_log = fetcher.call_log();

    let orchestrator = fixture.orchestrator(catalog, fetcher, FakeConcatenator);
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start run");

    let result = handle.await.expect("Worker should complete");
    assert!(!result.success);
    assert_eq!(result.final_phase, RipPhase::Failed);
    assert!(
        result
            .error_message
            .expect("error message")
            .contains("connection reset")
    );

    assert!(call_log.lock().expect("call log lock").is_empty());
    assert!(fixture.list_output_files().is_empty());
    assert_eq!(fixture.staged_file_count(), 0);
}

// =============================================================================
// Cancellation Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_cancel_before_confirmation_downloads_nothing() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::new(
        "Cut Short",
        vec![record("A", "id-a"), record("B", "id-b")],
    );
    let fetcher = FakeFetcher::new();
    let call_log = fetcher.call_log();

    let orchestrator = fixture.orchestrator(catalog, fetcher, FakeConcatenator);
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start run");

    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;

    // Cancellation requested before the download phase begins is observed
    // at the first item boundary
    orchestrator.cancel();
    orchestrator.confirm(true).await.expect("Should confirm");

    let result = handle.await.expect("Worker should complete");
    assert!(result.was_cancelled);
    assert!(!result.success);
    assert_eq!(result.final_phase, RipPhase::Cancelled);
    assert_eq!(result.tracks_downloaded, 0);
    assert!(result.error_message.is_none());

    assert!(call_log.lock().expect("call log lock").is_empty());
    assert_eq!(fixture.staged_file_count(), 0);

    // The exported track list survives cancellation
    assert_eq!(fixture.list_output_files(), vec!["cut_short.txt"]);
}

#[tokio::test]
async fn test_run_can_restart_after_cancellation() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::new("Second Chance", vec![record("A", "id-a")]);
    let fetcher = FakeFetcher::new();

    let orchestrator = fixture.orchestrator(catalog, fetcher, FakeConcatenator);

    // First run: cancelled before any download
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start first run");
    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;
    orchestrator.cancel();
    orchestrator.confirm(true).await.expect("Should confirm");
    let first = handle.await.expect("Worker should complete");
    assert_eq!(first.final_phase, RipPhase::Cancelled);
    assert_eq!(orchestrator.phase().await, RipPhase::Idle);

    // Second run on the same orchestrator completes; the cancel flag was
    // reset by start
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start second run");
    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;
    orchestrator.confirm(true).await.expect("Should confirm");
    let second = handle.await.expect("Worker should complete");
    assert!(second.success);
    assert_eq!(second.final_phase, RipPhase::Done);
    assert!(second.output_path.expect("merged output").exists());
}

// =============================================================================
// Merge Failure and Cleanup Tests
// =============================================================================

#[tokio::test]
async fn test_merge_failure_cleans_staging_and_manifest() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::new(
        "Doomed Merge",
        vec![record("A", "id-a"), record("B", "id-b")],
    );
    let fetcher = FakeFetcher::new();

    let orchestrator = fixture.orchestrator(catalog, fetcher, FailingConcatenator);
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start run");

    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;
    orchestrator.confirm(true).await.expect("Should confirm");

    let result = handle.await.expect("Worker should complete");
    assert!(!result.success);
    assert_eq!(result.final_phase, RipPhase::Failed);
    assert_eq!(result.tracks_downloaded, 2);
    assert!(
        result
            .error_message
            .expect("error message")
            .contains("Concatenation failed")
    );

    // Inputs and the merge manifest were removed on the failure path
    assert_eq!(fixture.staged_file_count(), 0);
    assert_eq!(fixture.list_output_files(), vec!["doomed_merge.txt"]);
}

#[tokio::test]
async fn test_all_downloads_failing_yields_no_merge_input() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::new(
        "Nothing Works",
        vec![record("A", "id-a"), record("B", "id-b")],
    );
    let fetcher = FakeFetcher::failing_for(&["id-a", "id-b"]);

    let orchestrator = fixture.orchestrator(catalog, fetcher, FakeConcatenator);
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start run");

    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;
    orchestrator.confirm(true).await.expect("Should confirm");

    let result = handle.await.expect("Worker should complete");
    assert!(!result.success);
    assert_eq!(result.final_phase, RipPhase::Failed);
    assert_eq!(result.tracks_downloaded, 0);
    assert_eq!(result.tracks_failed, 2);
    assert!(
        result
            .error_message
            .expect("error message")
            .contains("No downloaded tracks to merge")
    );

    assert_eq!(fixture.staged_file_count(), 0);
    assert_eq!(fixture.list_output_files(), vec!["nothing_works.txt"]);
}

// =============================================================================
// Event Stream Tests
// =============================================================================

#[tokio::test]
async fn test_event_stream_reports_run_lifecycle() {
    let fixture = TestFixture::new().expect("Should create fixture");
    let catalog = FakeCatalog::new("Eventful", vec![record("A", "id-a")]);
    let fetcher = FakeFetcher::new();

    let orchestrator = fixture.orchestrator(catalog, fetcher, FakeConcatenator);
    let handle = orchestrator
        .start(RipRequest::new(PlaylistRef::new("PLabc")))
        .expect("Should start run");

    wait_for_phase(&orchestrator, RipPhase::AwaitingConfirmation).await;
    orchestrator.confirm(true).await.expect("Should confirm");
    let result = handle.await.expect("Worker should complete");

    let events = drain_events(&orchestrator).await;

    let phases: Vec<RipPhase> = events
        .iter()
        .filter_map(|event| match event {
            RipEvent::PhaseChanged { phase } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            RipPhase::Resolving,
            RipPhase::Listing,
            RipPhase::AwaitingConfirmation,
            RipPhase::Downloading,
            RipPhase::Merging,
            RipPhase::Done,
        ]
    );

    // The tracklist event precedes any progress
    let tracklist_index = events
        .iter()
        .position(|event| matches!(event, RipEvent::TracklistReady { .. }))
        .expect("tracklist event");
    let first_progress_index = events
        .iter()
        .position(|event| matches!(event, RipEvent::Progress { .. }))
        .expect("progress event");
    assert!(tracklist_index < first_progress_index);

    match events.last() {
        Some(RipEvent::Finished { result: emitted }) => {
            assert_eq!(emitted.success, result.success);
            assert_eq!(emitted.output_path, result.output_path);
        }
        _ => panic!("Expected Finished as the last event"),
    }
}

// =============================================================================
// Configuration Workflow Tests
// =============================================================================

#[test]
fn test_startup_directories_created_from_config() {
    let temp = TempDir::new().expect("Should create temp dir");
    let config = AppConfig {
        api_key: Some("key".to_string()),
        staging_dir: temp.path().join("staging"),
        output_dir: temp.path().join("library").join("mixes"),
    };

    config
        .ensure_directories()
        .expect("Should create directories");
    assert!(config.staging_dir.is_dir());
    assert!(config.output_dir.is_dir());
}

// =============================================================================
// Playlist Reference Tests
// =============================================================================

#[test]
fn test_playlist_reference_accepted_forms() {
    let from_id = PlaylistRef::parse("PLabc123-_").expect("raw id");
    assert_eq!(from_id.as_str(), "PLabc123-_");

    let from_url =
        PlaylistRef::parse("https://www.youtube.com/playlist?list=PLabc123").expect("url");
    assert_eq!(from_url.as_str(), "PLabc123");

    let result = PlaylistRef::parse("https://www.youtube.com/watch?v=xyz");
    match result {
        Err(Error::Catalog(CatalogError::InvalidReference { .. })) => {}
        _ => panic!("Expected an invalid reference error"),
    }
}
