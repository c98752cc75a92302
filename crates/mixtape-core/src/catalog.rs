//! Remote playlist catalog access.
//!
//! Resolves a playlist reference to its human-readable name and lists the
//! playlist's items across pagination, normalizing provider responses into
//! [`Record`] values. Items without a usable external id are skipped; a
//! playlist that yields no usable item at all is reported as not found.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CatalogError, Result};

/// Default YouTube Data API v3 base URL.
const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Page size requested from the playlistItems endpoint (API maximum).
const PAGE_SIZE: u32 = 50;

/// Uploader name substituted when the catalog omits one.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

// =============================================================================
// Data Model
// =============================================================================

/// Opaque identifier of a source playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef(String);

impl PlaylistRef {
    /// Wrap an already-known playlist id without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a raw playlist id or a playlist URL carrying a `list=` parameter.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidReference {
                input: input.to_string(),
                reason: "reference is empty".to_string(),
            }
            .into());
        }

        let id = if let Some(start) = trimmed.find("list=") {
            let rest = &trimmed[start + "list=".len()..];
            let end = rest.find(['&', '#']).unwrap_or(rest.len());
            &rest[..end]
        } else {
            trimmed
        };

        if id.is_empty() {
            return Err(CatalogError::InvalidReference {
                input: input.to_string(),
                reason: "no playlist id after the list= parameter".to_string(),
            }
            .into());
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CatalogError::InvalidReference {
                input: input.to_string(),
                reason: "playlist ids contain only letters, digits, '-' and '_'".to_string(),
            }
            .into());
        }

        Ok(Self(id.to_string()))
    }

    /// The wrapped playlist id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One playable item from the catalog.
///
/// Ordering is significant: a record's position in the listed sequence
/// determines its position in the export manifest and the merged output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Item title as reported by the catalog.
    pub title: String,
    /// Uploader or artist name, [`UNKNOWN_ARTIST`] when the catalog omits it.
    pub uploader: String,
    /// Provider-scoped id used to fetch the item's media.
    pub external_id: String,
}

// =============================================================================
// Client Trait
// =============================================================================

/// Read-only access to a remote playlist catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Resolve the playlist's human-readable name.
    ///
    /// Returns [`CatalogError::NotFound`] when the playlist does not exist.
    async fn resolve_name(&self, reference: &PlaylistRef) -> Result<String>;

    /// List all records in playlist order, following pagination cursors
    /// until the provider stops returning one.
    ///
    /// Returns [`CatalogError::NotFound`] when no page yields a usable item.
    async fn list_items(&self, reference: &PlaylistRef) -> Result<Vec<Record>>;
}

// =============================================================================
// YouTube Implementation
// =============================================================================

/// Catalog client backed by the YouTube Data API v3.
#[derive(Debug, Clone)]
pub struct YouTubeCatalogClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl YouTubeCatalogClient {
    /// Create a client talking to the public API endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn playlist_url(&self, reference: &PlaylistRef) -> String {
        format!(
            "{}/playlists?part=snippet&id={}&key={}",
            self.api_base,
            urlencoding::encode(reference.as_str()),
            urlencoding::encode(&self.api_key)
        )
    }

    fn items_url(&self, reference: &PlaylistRef, cursor: Option<&str>) -> String {
        let mut url = format!(
            "{}/playlistItems?part=snippet&maxResults={}&playlistId={}&key={}",
            self.api_base,
            PAGE_SIZE,
            urlencoding::encode(reference.as_str()),
            urlencoding::encode(&self.api_key)
        );
        if let Some(cursor) = cursor {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(cursor));
        }
        url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url).send().await.map_err(|e| {
            CatalogError::RequestFailed {
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(CatalogError::Unauthorized {
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(CatalogError::RequestFailed {
                reason: format!("HTTP {status}"),
            }
            .into());
        }

        let body = response.bytes().await.map_err(|e| {
            CatalogError::RequestFailed {
                reason: e.to_string(),
            }
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            CatalogError::MalformedResponse {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl CatalogClient for YouTubeCatalogClient {
    async fn resolve_name(&self, reference: &PlaylistRef) -> Result<String> {
        debug!("Resolving playlist name for {}", reference);

        let url = self.playlist_url(reference);
        let page: PlaylistListResponse = self.get_json(&url).await?;

        page.items
            .into_iter()
            .next()
            .and_then(|resource| resource.snippet)
            .and_then(|snippet| snippet.title)
            .ok_or_else(|| {
                CatalogError::NotFound {
                    reference: reference.to_string(),
                }
                .into()
            })
    }

    async fn list_items(&self, reference: &PlaylistRef) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let url = self.items_url(reference, cursor.as_deref());
            let page: PlaylistItemsResponse = self.get_json(&url).await?;
            pages += 1;

            records.extend(page.items.into_iter().filter_map(record_from_item));

            match page.next_page_token {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        if records.is_empty() {
            debug!(
                "Playlist {} yielded no usable items across {} page(s)",
                reference, pages
            );
            return Err(CatalogError::NotFound {
                reference: reference.to_string(),
            }
            .into());
        }

        info!(
            "Listed {} item(s) for playlist {} over {} page(s)",
            records.len(),
            reference,
            pages
        );
        Ok(records)
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct PlaylistListResponse {
    #[serde(default)]
    items: Vec<PlaylistResource>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResource {
    snippet: Option<PlaylistSnippet>,
}

#[derive(Debug, Deserialize)]
struct PlaylistSnippet {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItemResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemResource {
    snippet: Option<ItemSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSnippet {
    title: Option<String>,
    video_owner_channel_title: Option<String>,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

/// Map one wire item to a [`Record`], dropping items without an external id.
fn record_from_item(item: PlaylistItemResource) -> Option<Record> {
    let snippet = item.snippet?;

    let external_id = snippet
        .resource_id
        .and_then(|resource| resource.video_id)
        .filter(|id| !id.is_empty())?;

    let uploader = snippet
        .video_owner_channel_title
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

    Some(Record {
        title: snippet.title.unwrap_or_default(),
        uploader,
        external_id,
    })
}
