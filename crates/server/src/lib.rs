//! Control API for the Swarmcast torrent manager.
//!
//! A local JSON HTTP API and WebSocket event feed over
//! [`swarmcast_core::TorrentManager`].

pub mod api;
pub mod metrics;
pub mod state;
