//! Ordered concatenation of downloaded tracks.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::download::DownloadedTrack;
use crate::error::{FileSystemError, MergeError, Result};
use crate::export::FALLBACK_STEM;
use crate::fetch::AUDIO_EXTENSION;
use crate::sanitize::sanitize_or;

/// Name of the concatenation binary looked up on PATH.
const FFMPEG_BINARY: &str = "ffmpeg";

/// File name of the ephemeral concat manifest inside the output directory.
const MERGE_MANIFEST_NAME: &str = "filelist.txt";

// =============================================================================
// Concatenator
// =============================================================================

/// Concatenates a manifest of audio files into one output file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Concatenator: Send + Sync {
    /// Concatenate the files listed in `manifest_path` into `output_path`.
    ///
    /// A non-zero tool exit surfaces as [`MergeError::ConcatFailed`].
    async fn concat(&self, manifest_path: &Path, output_path: &Path) -> Result<()>;
}

/// [`Concatenator`] backed by ffmpeg's concat demuxer with stream copy.
#[derive(Debug, Clone)]
pub struct FfmpegConcatenator {
    binary_path: PathBuf,
}

impl FfmpegConcatenator {
    /// Create a concatenator using the given ffmpeg binary.
    #[must_use]
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Locate ffmpeg on PATH.
    #[must_use]
    pub fn from_path() -> Option<Self> {
        which::which(FFMPEG_BINARY).ok().map(Self::new)
    }
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn concat(&self, manifest_path: &Path, output_path: &Path) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(manifest_path)
            .arg("-c")
            .arg("copy")
            .arg(output_path)
            .output()
            .await
            .map_err(|e| MergeError::ToolUnavailable {
                tool: self.binary_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MergeError::ConcatFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(())
    }
}

// =============================================================================
// Merger
// =============================================================================

/// Merges downloaded tracks into the final output file.
///
/// The concat manifest and every surviving per-item input are deleted on
/// every exit path, success or failure.
#[derive(Debug, Clone)]
pub struct Merger {
    output_dir: PathBuf,
}

impl Merger {
    /// Create a merger writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Concatenate `tracks` in order into `<sanitized name>.mp3`.
    ///
    /// Returns [`MergeError::NoInput`] when there is nothing to merge.
    /// Inputs that vanished from disk are skipped with a warning.
    pub async fn merge(
        &self,
        concatenator: &dyn Concatenator,
        playlist_name: &str,
        tracks: &[DownloadedTrack],
    ) -> Result<PathBuf> {
        if tracks.is_empty() {
            return Err(MergeError::NoInput.into());
        }

        let mut inputs = Vec::with_capacity(tracks.len());
        for track in tracks {
            if track.path.exists() {
                let absolute =
                    fs::canonicalize(&track.path).unwrap_or_else(|_| track.path.clone());
                inputs.push(absolute);
            } else {
                warn!("Skipping missing input {}", track.path.display());
            }
        }

        if inputs.is_empty() {
            warn!(
                "All {} input file(s) are missing, nothing to merge",
                tracks.len()
            );
            return Err(MergeError::NoInput.into());
        }

        let stem = sanitize_or(playlist_name, FALLBACK_STEM);
        let manifest_path = self.output_dir.join(MERGE_MANIFEST_NAME);
        let output_path = self.output_dir.join(format!("{stem}.{AUDIO_EXTENSION}"));

        // Covers the manifest and the inputs from this point on, whatever
        // exit path the merge takes.
        let _cleanup = StagingCleanup::new(
            std::iter::once(manifest_path.clone())
                .chain(inputs.iter().cloned())
                .collect(),
        );

        let mut manifest = String::new();
        for input in &inputs {
            manifest.push_str(&manifest_line(input));
        }

        fs::write(&manifest_path, manifest).map_err(|e| {
            FileSystemError::WriteFailed {
                path: manifest_path.clone(),
                reason: format!("Failed to write concat manifest: {e}"),
            }
        })?;

        info!(
            "Merging {} track(s) into {}",
            inputs.len(),
            output_path.display()
        );
        concatenator.concat(&manifest_path, &output_path).await?;

        info!("Merged output written to {}", output_path.display());
        Ok(output_path)
    }
}

/// One concat manifest line; single quotes in the path are escaped the way
/// the concat demuxer expects.
fn manifest_line(path: &Path) -> String {
    let escaped = path.display().to_string().replace('\'', "'\\''");
    format!("file '{escaped}'\n")
}

/// Remove the staged files of `tracks`, logging failures.
///
/// Used when a cancelled run abandons its downloads without reaching the
/// merge.
pub fn discard_tracks(tracks: &[DownloadedTrack]) {
    for track in tracks {
        if track.path.exists() {
            match fs::remove_file(&track.path) {
                Ok(()) => debug!("Removed staged file {}", track.path.display()),
                Err(e) => warn!("Failed to remove {}: {}", track.path.display(), e),
            }
        }
    }
}

/// Removes a fixed set of files when dropped.
struct StagingCleanup {
    files: Vec<PathBuf>,
}

impl StagingCleanup {
    fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }
}

impl Drop for StagingCleanup {
    fn drop(&mut self) {
        for file in &self.files {
            if file.exists()
                && let Err(e) = fs::remove_file(file)
            {
                warn!("Failed to remove {}: {}", file.display(), e);
            }
        }
    }
}
