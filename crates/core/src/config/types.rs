use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::lifecycle::LifecycleConfig;
use crate::player::PlayerConfig;
use crate::stream::StreamConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// When set, every catalog mutation is refused and reported as a no-op.
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub transfer: TransferSettings,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

/// Control API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8090
}

/// Catalog database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("swarmcast.db")
}

/// Embedded librqbit engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Where partial and complete downloads are written.
    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
    #[serde(default = "default_true")]
    pub enable_dht: bool,
    /// Fixed peer listen port; OS-assigned when unset.
    #[serde(default)]
    pub listen_port: Option<u16>,
    /// Directory for librqbit's own session state. Disabled when unset.
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            enable_dht: true,
            listen_port: None,
            persistence_path: None,
        }
    }
}

fn default_download_path() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_true() -> bool {
    true
}

/// Global transfer settings. Changing them at runtime goes through
/// `TorrentManager::reconfigure`, which restarts every swarm session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransferSettings {
    /// Piece cache capacity per torrent, in bytes.
    #[serde(default = "default_cache_size")]
    pub cache_size: u64,
    /// Share of the cache to fetch before playback starts, at most 100.
    /// Zero or less disables the preload.
    #[serde(default = "default_preload_percent")]
    pub preload_percent: i32,
    /// Maximum peer connections per torrent (0 = engine default).
    #[serde(default)]
    pub connections_limit: u32,
    /// Bytes/sec, 0 = unlimited.
    #[serde(default)]
    pub download_rate_limit: u64,
    /// Bytes/sec, 0 = unlimited.
    #[serde(default)]
    pub upload_rate_limit: u64,
    /// How long an idle torrent stays in memory after its last use.
    /// Capped at 60 seconds when applied.
    #[serde(default = "default_disconnect_timeout")]
    pub disconnect_timeout_secs: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
            preload_percent: default_preload_percent(),
            connections_limit: 0,
            download_rate_limit: 0,
            upload_rate_limit: 0,
            disconnect_timeout_secs: default_disconnect_timeout(),
        }
    }
}

fn default_cache_size() -> u64 {
    64 * 1024 * 1024
}

fn default_preload_percent() -> i32 {
    50
}

fn default_disconnect_timeout() -> u64 {
    30
}

/// Sanitized config for API responses (local paths hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub read_only: bool,
    pub server: ServerConfig,
    pub engine: SanitizedEngineConfig,
    pub transfer: TransferSettings,
    pub lifecycle: LifecycleConfig,
    pub stream: StreamConfig,
    pub player: SanitizedPlayerConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEngineConfig {
    pub enable_dht: bool,
    pub listen_port: Option<u16>,
    pub persistence_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPlayerConfig {
    pub program: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            read_only: config.read_only,
            server: config.server.clone(),
            engine: SanitizedEngineConfig {
                enable_dht: config.engine.enable_dht,
                listen_port: config.engine.listen_port,
                persistence_enabled: config.engine.persistence_path.is_some(),
            },
            transfer: config.transfer.clone(),
            lifecycle: config.lifecycle.clone(),
            stream: config.stream.clone(),
            player: SanitizedPlayerConfig {
                program: config.player.program.clone(),
            },
        }
    }
}
