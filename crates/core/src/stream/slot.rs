//! Process-wide holder for the single active stream gateway.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::{StreamConfig, StreamError, StreamGateway, StreamSessionInfo};
use crate::swarm::SwarmSession;
use crate::torrent::InfoHash;

/// At most one gateway is active at a time. Starting a new one closes the
/// previous one first.
pub struct GatewaySlot {
    config: StreamConfig,
    /// Serializes `start` so two starts cannot interleave.
    start_lock: Mutex<()>,
    active: RwLock<Option<Arc<StreamGateway>>>,
}

impl GatewaySlot {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            start_lock: Mutex::new(()),
            active: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Close any active gateway, then start one for `file_index`.
    pub async fn start(
        &self,
        session: Arc<dyn SwarmSession>,
        file_index: usize,
        preload_percent: i32,
    ) -> Result<Arc<StreamGateway>, StreamError> {
        let _guard = self.start_lock.lock().await;

        let previous = self.active.write().await.take();
        if let Some(previous) = previous {
            info!(session_id = %previous.id(), "Replacing active stream gateway");
            previous.stop().await;
        }

        let gateway =
            StreamGateway::start(session, file_index, preload_percent, self.config.clone())
                .await?;
        *self.active.write().await = Some(gateway.clone());
        Ok(gateway)
    }

    /// The active gateway, if any.
    pub async fn active(&self) -> Option<Arc<StreamGateway>> {
        self.active.read().await.clone()
    }

    pub async fn info(&self) -> Option<StreamSessionInfo> {
        self.active.read().await.as_ref().map(|g| g.info())
    }

    /// Stop the active gateway. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let gateway = self.active.write().await.take();
        match gateway {
            Some(gateway) => {
                gateway.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop the active gateway only if it is the given session.
    pub async fn stop_session(&self, gateway: &Arc<StreamGateway>) {
        let taken = {
            let mut active = self.active.write().await;
            match active.as_ref() {
                Some(current) if Arc::ptr_eq(current, gateway) => active.take(),
                _ => None,
            }
        };
        // Stop regardless; a replaced gateway is already closed and this
        // returns immediately.
        drop(taken);
        gateway.stop().await;
    }

    /// Stop the active gateway only if it streams the given torrent.
    pub async fn stop_for(&self, hash: &InfoHash) -> bool {
        let taken = {
            let mut active = self.active.write().await;
            match active.as_ref() {
                Some(current) if current.hash() == *hash => active.take(),
                _ => None,
            }
        };
        match taken {
            Some(gateway) => {
                gateway.stop().await;
                true
            }
            None => false,
        }
    }
}
