//! Error types for Mixtape core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Mixtape core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote catalog retrieval failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A single track download failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Track concatenation failed.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// File system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// A run is already active on this orchestrator.
    #[error("A run is already in progress")]
    RunInProgress,

    /// No run is currently waiting for a confirmation decision.
    #[error("No run is awaiting confirmation")]
    NoPendingConfirmation,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced while talking to the remote catalog.
///
/// `NotFound` is user-correctable; the remaining variants are fatal to the
/// run and are never retried by the caller.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The input is neither a playlist id nor a playlist URL.
    #[error("Invalid playlist reference '{input}': {reason}")]
    InvalidReference {
        /// The raw user input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The playlist does not exist, or it contains no usable items.
    #[error("Playlist not found: {reference}")]
    NotFound {
        /// The playlist reference that was looked up.
        reference: String,
    },

    /// The catalog rejected the request credentials.
    #[error("Catalog request unauthorized (HTTP {status}), check the API key")]
    Unauthorized {
        /// HTTP status code returned by the catalog.
        status: u16,
    },

    /// The catalog request could not be completed.
    #[error("Catalog request failed: {reason}")]
    RequestFailed {
        /// Transport or HTTP failure detail.
        reason: String,
    },

    /// The catalog response body could not be parsed.
    #[error("Malformed catalog response: {reason}")]
    MalformedResponse {
        /// Deserialization failure detail.
        reason: String,
    },
}

/// Errors surfaced by the external audio downloader for a single item.
///
/// These never abort a batch; the pipeline logs them and moves on.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The download tool could not be started.
    #[error("Failed to run {tool}: {reason}")]
    ToolUnavailable {
        /// Tool binary name or path.
        tool: String,
        /// Spawn failure detail.
        reason: String,
    },

    /// The download tool exited unsuccessfully.
    #[error("Download of {external_id} failed ({status}): {stderr}")]
    ToolFailed {
        /// External id of the item being fetched.
        external_id: String,
        /// Process exit status.
        status: String,
        /// Captured standard error output.
        stderr: String,
    },

    /// The download tool reported success but produced no file.
    #[error("Download tool produced no file at {path}")]
    MissingOutput {
        /// Expected output path.
        path: PathBuf,
    },
}

/// Errors surfaced while concatenating downloaded tracks.
#[derive(Debug, Error)]
pub enum MergeError {
    /// There were no downloaded tracks to merge.
    #[error("No downloaded tracks to merge")]
    NoInput,

    /// The concatenation tool could not be started.
    #[error("Failed to run {tool}: {reason}")]
    ToolUnavailable {
        /// Tool binary name or path.
        tool: String,
        /// Spawn failure detail.
        reason: String,
    },

    /// The concatenation tool exited unsuccessfully.
    #[error("Concatenation failed ({status}): {stderr}")]
    ConcatFailed {
        /// Process exit status.
        status: String,
        /// Captured standard error output.
        stderr: String,
    },
}

/// Errors surfaced by local file-system operations.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Directory creation failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying failure detail.
        reason: String,
    },

    /// File write failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying failure detail.
        reason: String,
    },

    /// File read failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying failure detail.
        reason: String,
    },
}
