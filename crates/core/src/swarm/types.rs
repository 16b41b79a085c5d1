//! Types for swarm engine operations.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::PieceCache;
use crate::config::TransferSettings;
use crate::torrent::{InfoHash, TorrentSpec};

/// Errors that can occur during swarm engine operations.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Metadata not yet available for {0}")]
    MetadataPending(InfoHash),

    #[error("File index {index} out of range ({count} files)")]
    FileOutOfRange { index: usize, count: usize },

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// One file inside a torrent, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmFile {
    /// Path relative to the torrent root.
    pub path: String,
    /// Length in bytes.
    pub length: u64,
}

/// Live transfer statistics for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmStats {
    /// Known peers (connected, connecting and queued).
    pub peers: u32,
    /// Peers currently exchanging data.
    pub seeders: u32,
    /// Download rate in bytes/sec.
    pub download_rate: u64,
    /// Upload rate in bytes/sec.
    pub upload_rate: u64,
    /// Verified bytes on disk.
    pub downloaded: u64,
    /// Total torrent size in bytes (0 until metadata arrives).
    pub total: u64,
}

impl SwarmStats {
    /// Completion percentage, 0.0 when the size is unknown.
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.downloaded as f64 / self.total as f64 * 100.0).min(100.0)
        }
    }
}

/// Half-open byte range `[start, end)` within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// From `start` to the end of the file.
    pub fn from_offset(start: u64) -> Self {
        Self {
            start,
            end: u64::MAX,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Clamp the end to a known file length.
    pub fn clamp_to(&self, length: u64) -> Self {
        Self::new(self.start.min(length), self.end.min(length))
    }
}

/// A peer-to-peer engine capable of joining swarms.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Join the swarm for a torrent. Returns as soon as the session exists;
    /// metadata may arrive later.
    async fn join(&self, spec: &TorrentSpec) -> Result<Arc<dyn SwarmSession>, SwarmError>;

    /// Apply new transfer settings. Callers close every session first; the
    /// engine disconnects and reconnects with the new limits.
    async fn reconfigure(&self, settings: &TransferSettings) -> Result<(), SwarmError>;
}

/// A live session for one torrent.
#[async_trait]
pub trait SwarmSession: Send + Sync {
    fn info_hash(&self) -> InfoHash;

    /// Whether the file list and total size are known.
    fn metadata_ready(&self) -> bool;

    /// Torrent name from metadata, if known.
    fn name(&self) -> Option<String>;

    /// Files in metadata order. Empty until metadata arrives.
    fn files(&self) -> Vec<SwarmFile>;

    /// Read `len` bytes at `offset` of a file, waiting until the engine has
    /// downloaded them. Reads are clamped at end of file.
    async fn read_at(&self, file_index: usize, offset: u64, len: usize)
        -> Result<Bytes, SwarmError>;

    /// Hint that a byte range should be downloaded ahead of other pieces.
    /// A newer hint supersedes the previous one.
    fn prioritize(&self, file_index: usize, range: ByteRange);

    fn stats(&self) -> SwarmStats;

    /// The piece cache fed by this session's reads.
    fn cache(&self) -> Arc<PieceCache>;

    /// Leave the swarm and release resources. Returns once teardown is
    /// complete. With `delete_files`, partial downloads are removed.
    async fn close(&self, delete_files: bool) -> Result<(), SwarmError>;
}
