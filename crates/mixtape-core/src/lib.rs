//! Mixtape Core Library
//!
//! This crate provides the core functionality for the Mixtape application:
//! - Playlist catalog resolution and listing
//! - Track list export
//! - Sequential audio downloading with progress and cancellation
//! - Concatenation of downloaded tracks into one audio file
//! - Run orchestration with confirmation, cancellation, and events

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod export;
pub mod fetch;
pub mod logging;
pub mod merge;
pub mod rip;
pub mod sanitize;

pub use catalog::{CatalogClient, PlaylistRef, Record, YouTubeCatalogClient};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use fetch::{AudioFetcher, YtDlpFetcher};
pub use merge::{Concatenator, FfmpegConcatenator};
pub use rip::{RipEvent, RipOrchestrator, RipPhase, RipRequest, RipResult};
