//! Lifecycle manager configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the torrent lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// How often the background watch checks for metadata (milliseconds).
    #[serde(default = "default_metadata_poll_interval")]
    pub metadata_poll_interval_ms: u64,

    /// How long the background watch waits for metadata before giving up.
    /// The torrent stays listed with provisional data.
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,

    /// How often idle handles are evicted from memory (seconds).
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// Rejoin every catalog entry in the background at startup.
    #[serde(default)]
    pub restore_on_start: bool,
}

fn default_metadata_poll_interval() -> u64 {
    500
}

fn default_metadata_timeout() -> u64 {
    60
}

fn default_reaper_interval() -> u64 {
    10
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            metadata_poll_interval_ms: default_metadata_poll_interval(),
            metadata_timeout_secs: default_metadata_timeout(),
            reaper_interval_secs: default_reaper_interval(),
            restore_on_start: false,
        }
    }
}
