use std::sync::Arc;
use swarmcast_core::{Config, Player, SanitizedConfig, TorrentManager};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    manager: Arc<TorrentManager>,
    player: Arc<dyn Player>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        manager: Arc<TorrentManager>,
        player: Arc<dyn Player>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            manager,
            player,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn manager(&self) -> &Arc<TorrentManager> {
        &self.manager
    }

    /// The external player launched by play requests.
    pub fn player(&self) -> &dyn Player {
        self.player.as_ref()
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
