//! Torrent catalog - the durable record of every torrent the user has added.
//!
//! The catalog survives restarts and is independent of whether a torrent is
//! currently joined to a swarm.

mod sqlite;
mod types;

pub use sqlite::SqliteCatalog;
pub use types::*;

use crate::torrent::InfoHash;

/// Trait for torrent catalog storage.
pub trait TorrentCatalog: Send + Sync {
    /// Get a record by hash.
    fn get(&self, hash: &InfoHash) -> Result<TorrentRecord, CatalogError>;

    /// Insert or replace a record. The write is atomic per key: readers see
    /// either the previous record or the new one, never a mix.
    fn put(&self, record: &TorrentRecord) -> Result<(), CatalogError>;

    /// Delete a record. Returns whether a record existed.
    fn delete(&self, hash: &InfoHash) -> Result<bool, CatalogError>;

    /// All records, newest first.
    fn list(&self) -> Result<Vec<TorrentRecord>, CatalogError>;

    /// Check if a record exists.
    fn exists(&self, hash: &InfoHash) -> Result<bool, CatalogError>;
}
