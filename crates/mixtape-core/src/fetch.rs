//! External audio download tool integration.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{FetchError, Result};

/// Name of the download binary looked up on PATH.
const YT_DLP_BINARY: &str = "yt-dlp";

/// Watch URL prefix for a single external id.
const WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";

/// Fixed audio extension shared by staged files and the merged output.
pub(crate) const AUDIO_EXTENSION: &str = "mp3";

/// Fixed output settings applied to every fetched track.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Target audio format passed to the tool's extraction postprocessor.
    pub audio_format: String,
    /// Target bitrate in kbit/s.
    pub bitrate_kbps: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            audio_format: AUDIO_EXTENSION.to_string(),
            bitrate_kbps: 320,
        }
    }
}

/// Downloads one item's audio track to a caller-chosen destination.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Fetch the audio for `external_id` and store it at `destination`.
    ///
    /// `destination` carries the final extension; the implementation must
    /// produce exactly that file on success. A failure affects only this
    /// item and never the rest of the batch.
    async fn fetch_audio(&self, external_id: &str, destination: &Path) -> Result<()>;
}

/// [`AudioFetcher`] backed by the yt-dlp command line tool.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary_path: PathBuf,
    options: FetchOptions,
}

impl YtDlpFetcher {
    /// Create a fetcher using the given yt-dlp binary.
    #[must_use]
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            options: FetchOptions::default(),
        }
    }

    /// Locate yt-dlp on PATH.
    #[must_use]
    pub fn from_path() -> Option<Self> {
        which::which(YT_DLP_BINARY).ok().map(Self::new)
    }

    /// Replace the fixed output settings.
    #[must_use]
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    /// Output template for `destination`; the tool downloads under its own
    /// intermediate extension before the audio postprocessor renames the
    /// file to the requested one.
    fn output_template(destination: &Path) -> PathBuf {
        destination.with_extension("%(ext)s")
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch_audio(&self, external_id: &str, destination: &Path) -> Result<()> {
        let url = format!("{WATCH_URL_BASE}{external_id}");
        let template = Self::output_template(destination);

        debug!(
            "Fetching audio for {} into {}",
            external_id,
            destination.display()
        );

        let output = Command::new(&self.binary_path)
            .arg("--no-playlist")
            .arg("--format")
            .arg("bestaudio")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg(&self.options.audio_format)
            .arg("--audio-quality")
            .arg(format!("{}K", self.options.bitrate_kbps))
            .arg("--output")
            .arg(&template)
            .arg(&url)
            .output()
            .await
            .map_err(|e| FetchError::ToolUnavailable {
                tool: self.binary_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(FetchError::ToolFailed {
                external_id: external_id.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        if !destination.exists() {
            return Err(FetchError::MissingOutput {
                path: destination.to_path_buf(),
            }
            .into());
        }

        Ok(())
    }
}
