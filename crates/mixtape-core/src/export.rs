//! Human-readable track list export.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::catalog::Record;
use crate::error::{Error, FileSystemError, Result};
use crate::sanitize::sanitize_or;

/// Stem used when a playlist name sanitizes to nothing.
pub(crate) const FALLBACK_STEM: &str = "playlist";

/// Writes the per-run track list into the output directory.
///
/// The export is a side artifact for the end user; later stages never read
/// it back.
#[derive(Debug, Clone)]
pub struct ManifestExporter {
    output_dir: PathBuf,
}

impl ManifestExporter {
    /// Create an exporter writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write the track list for `records`, returning the written path.
    ///
    /// The file is named from the sanitized playlist name and overwrites any
    /// existing file of the same name. Format: the playlist name, a blank
    /// line, then one block per record with title, artist, and video id, in
    /// record order.
    pub fn write(&self, playlist_name: &str, records: &[Record]) -> Result<PathBuf> {
        let stem = sanitize_or(playlist_name, FALLBACK_STEM);
        let path = self.output_dir.join(format!("{stem}.txt"));

        let mut content = String::new();
        content.push_str(playlist_name);
        content.push_str("\n\n");
        for record in records {
            content.push_str(&format!(
                "Title: {}\nArtist: {}\nVideo ID: {}\n\n",
                record.title, record.uploader, record.external_id
            ));
        }

        fs::write(&path, &content).map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: path.clone(),
                reason: format!("Failed to write track list: {e}"),
            })
        })?;

        info!("Exported {} record(s) to {}", records.len(), path.display());
        Ok(path)
    }
}
