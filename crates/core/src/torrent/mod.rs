//! Torrent identity and add-specs.
//!
//! This module turns whatever the user typed (magnet link, `.torrent` path,
//! uploaded `.torrent` bytes or a bare info hash) into a [`TorrentSpec`] that
//! the swarm engine can join and the catalog can persist.

mod hash;
mod input;

pub use hash::InfoHash;
pub use input::{InputError, TorrentInput, TorrentSpec};
