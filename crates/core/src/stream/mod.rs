//! Stream gateway: exposes one file of a torrent as a local, seekable HTTP
//! endpoint, gated until enough data is buffered.
//!
//! Lifecycle of a gateway:
//!
//! ```text
//! Idle -> Binding -> Buffering -> Serving -> Closing -> Closed
//! ```
//!
//! Requests that arrive while buffering wait for `Serving`. Once closing
//! starts, bodies stop emitting data and new requests receive `503`.

mod config;
mod gateway;
mod range;
mod slot;

pub use config::StreamConfig;
pub use gateway::{StreamGateway, STREAM_PATH};
pub use range::{parse_range, RangeRequest};
pub use slot::GatewaySlot;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::torrent::InfoHash;

/// Gateway state. Ordered by progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    Idle,
    Binding,
    Buffering,
    Serving,
    Closing,
    Closed,
}

impl GatewayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayState::Idle => "idle",
            GatewayState::Binding => "binding",
            GatewayState::Buffering => "buffering",
            GatewayState::Serving => "serving",
            GatewayState::Closing => "closing",
            GatewayState::Closed => "closed",
        }
    }
}

/// Public description of a running stream session.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSessionInfo {
    pub id: Uuid,
    pub hash: InfoHash,
    pub file_index: usize,
    pub path: String,
    pub length: u64,
    pub url: String,
    pub state: GatewayState,
}

/// Errors from the stream gateway.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Failed to bind stream endpoint: {0}")]
    ResourceExhausted(String),

    #[error("File {index} not found in torrent {hash}")]
    FileNotFound { hash: InfoHash, index: usize },

    #[error("Stream gateway closed")]
    Closed,
}
