//! Types for the torrent catalog.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::torrent::{InfoHash, TorrentSpec};

/// A durable catalog entry for a known torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    /// Info hash (unique key).
    pub hash: InfoHash,
    /// User-visible title.
    pub title: String,
    /// Poster image reference (URL or path), empty when unset.
    #[serde(default)]
    pub poster: String,
    /// Category label, empty when unset.
    #[serde(default)]
    pub category: String,
    /// Declared total size in bytes (0 until metadata arrives).
    pub size_bytes: u64,
    /// Number of files (0 until metadata arrives).
    #[serde(default)]
    pub file_count: u32,
    /// Creation time (unix seconds).
    pub timestamp: i64,
    /// Opaque user payload.
    #[serde(default)]
    pub data: String,
    /// Add-spec used to rejoin the swarm.
    pub spec: TorrentSpec,
}

impl TorrentRecord {
    /// A provisional record: only what the user supplied or the input implies.
    pub fn provisional(spec: TorrentSpec, timestamp: i64) -> Self {
        Self {
            hash: spec.info_hash,
            title: spec.display_name.clone().unwrap_or_default(),
            poster: String::new(),
            category: String::new(),
            size_bytes: 0,
            file_count: 0,
            timestamp,
            data: String::new(),
            spec,
        }
    }
}

/// Errors for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt record {0}: {1}")]
    Corrupt(String, String),
}
