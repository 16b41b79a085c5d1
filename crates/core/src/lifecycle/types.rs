//! Types for the lifecycle manager.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, TorrentRecord};
use crate::player::PlayerError;
use crate::stream::StreamError;
use crate::swarm::SwarmError;
use crate::torrent::{InfoHash, InputError};

/// Whether a torrent's file list is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStatus {
    Loading,
    Ready,
}

/// Read model for one torrent, merged from the catalog and the live handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentView {
    pub hash: InfoHash,
    pub title: String,
    /// Name from the add-spec or the swarm metadata.
    pub name: Option<String>,
    pub poster: String,
    pub category: String,
    pub size_bytes: u64,
    pub file_count: u32,
    pub timestamp: i64,
    pub data: String,
    pub status: TorrentStatus,
    /// A background metadata watch is running for this torrent.
    pub loading_meta: bool,
    pub progress: f64,
    pub peers: u32,
    pub seeders: u32,
    pub download_rate: u64,
    pub upload_rate: u64,
    /// True when the view came from a resident handle.
    pub live: bool,
}

impl TorrentView {
    /// View of a torrent that is only in the catalog.
    pub fn from_record(record: &TorrentRecord) -> Self {
        Self {
            hash: record.hash,
            title: record.title.clone(),
            name: record.spec.display_name.clone(),
            poster: record.poster.clone(),
            category: record.category.clone(),
            size_bytes: record.size_bytes,
            file_count: record.file_count,
            timestamp: record.timestamp,
            data: record.data.clone(),
            status: if record.file_count > 0 {
                TorrentStatus::Ready
            } else {
                TorrentStatus::Loading
            },
            loading_meta: false,
            progress: 0.0,
            peers: 0,
            seeders: 0,
            download_rate: 0,
            upload_rate: 0,
            live: false,
        }
    }
}

/// Newest first, then by title descending, then by hash for a total order.
/// Titles compare byte-wise.
pub fn sort_views(views: &mut [TorrentView]) {
    views.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.title.cmp(&a.title))
            .then_with(|| b.hash.cmp(&a.hash))
    });
}

/// One file of a torrent as listed to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFileView {
    /// 1-based position in the torrent's metadata order.
    pub index: usize,
    pub path: String,
    pub size: u64,
}

/// Live transfer statistics plus the piece cache fill state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentStatsView {
    pub hash: InfoHash,
    pub peers: u32,
    pub seeders: u32,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub downloaded: u64,
    pub total: u64,
    pub progress: f64,
    pub cache_filled: u64,
    pub cache_capacity: u64,
}

/// User-editable details. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentDetails {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl TorrentDetails {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.poster.is_none()
            && self.category.is_none()
            && self.data.is_none()
    }

    /// Overwrite the record fields that are set here.
    pub fn apply_to(&self, record: &mut TorrentRecord) {
        if let Some(ref title) = self.title {
            record.title = title.clone();
        }
        if let Some(ref poster) = self.poster {
            record.poster = poster.clone();
        }
        if let Some(ref category) = self.category {
            record.category = category.clone();
        }
        if let Some(ref data) = self.data {
            record.data = data.clone();
        }
    }
}

/// Result of `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveOutcome {
    Removed,
    /// Nothing was known under that hash. Not an error.
    NotFound,
    /// Configured read-only; nothing was changed.
    ReadOnly,
}

impl RemoveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoveOutcome::Removed => "removed",
            RemoveOutcome::NotFound => "not_found",
            RemoveOutcome::ReadOnly => "read_only",
        }
    }
}

/// Result of `reconfigure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconfigureOutcome {
    Applied,
    ReadOnly,
}

impl ReconfigureOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconfigureOutcome::Applied => "applied",
            ReconfigureOutcome::ReadOnly => "read_only",
        }
    }
}

/// Result of `update_details`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(TorrentView),
    ReadOnly,
}

/// Errors surfaced by the lifecycle manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Metadata not yet available for {0}")]
    MetadataPending(InfoHash),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("Stream error: {0}")]
    Stream(StreamError),

    #[error("Player error: {0}")]
    Player(#[from] PlayerError),
}

impl From<InputError> for ManagerError {
    fn from(e: InputError) -> Self {
        ManagerError::InvalidInput(e.to_string())
    }
}

impl From<StreamError> for ManagerError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::ResourceExhausted(msg) => ManagerError::ResourceExhausted(msg),
            StreamError::FileNotFound { hash, index } => {
                ManagerError::NotFound(format!("file {} in torrent {}", index + 1, hash))
            }
            other => ManagerError::Stream(other),
        }
    }
}
