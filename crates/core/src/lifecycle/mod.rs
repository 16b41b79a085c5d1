//! Torrent lifecycle: the handle table, background metadata resolution,
//! and the operations exposed to the control surface.

mod config;
mod events;
mod handle;
mod manager;
mod types;

pub use config::LifecycleConfig;
pub use events::{MetadataEvents, MetadataReady};
pub use handle::{HandleTable, StreamGuard, TorrentHandle};
pub use manager::TorrentManager;
pub use types::*;
