//! Stream gateway configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the buffering gate and the range server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// How often the buffering gate samples the cache (milliseconds).
    #[serde(default = "default_buffer_poll_interval")]
    pub buffer_poll_interval_ms: u64,

    /// Contiguous bytes required before serving starts. Clamped to the
    /// cache capacity, since the cache never reports more than that.
    #[serde(default = "default_min_buffer_bytes")]
    pub min_buffer_bytes: u64,

    /// Upper bound on the buffering wait; serving starts anyway once it
    /// elapses (milliseconds).
    #[serde(default = "default_max_buffer_wait")]
    pub max_buffer_wait_ms: u64,

    /// Grace period for in-flight responses on shutdown (milliseconds).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,

    /// Bytes per engine read when streaming a response body.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_buffer_poll_interval() -> u64 {
    500
}

fn default_min_buffer_bytes() -> u64 {
    32 * 1024 * 1024
}

fn default_max_buffer_wait() -> u64 {
    5000
}

fn default_shutdown_grace() -> u64 {
    1000
}

fn default_chunk_size() -> usize {
    256 * 1024
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_poll_interval_ms: default_buffer_poll_interval(),
            min_buffer_bytes: default_min_buffer_bytes(),
            max_buffer_wait_ms: default_max_buffer_wait(),
            shutdown_grace_ms: default_shutdown_grace(),
            chunk_size: default_chunk_size(),
        }
    }
}
