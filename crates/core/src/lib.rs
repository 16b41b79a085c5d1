pub mod cache;
pub mod catalog;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod player;
pub mod stream;
pub mod swarm;
pub mod testing;
pub mod torrent;

pub use catalog::{CatalogError, SqliteCatalog, TorrentCatalog, TorrentRecord};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    TransferSettings,
};
pub use lifecycle::{
    LifecycleConfig, ManagerError, MetadataReady, ReconfigureOutcome, RemoveOutcome,
    TorrentDetails, TorrentManager, TorrentView, UpdateOutcome,
};
pub use player::{CommandPlayer, Player, PlayerConfig, PlayerError};
pub use stream::{GatewaySlot, GatewayState, StreamConfig, StreamError, StreamGateway};
pub use swarm::{LibrqbitEngine, SwarmEngine, SwarmError, SwarmSession};
pub use torrent::{InfoHash, InputError, TorrentInput, TorrentSpec};
