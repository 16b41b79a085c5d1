//! WebSocket event feed.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use swarmcast_core::{InfoHash, MetadataReady, TorrentManager};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Interval between heartbeat messages.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket message sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Swarm metadata arrived for a torrent.
    MetadataReady {
        hash: InfoHash,
        title: String,
        peers: u32,
        seeders: u32,
        file_count: u32,
        total_size: u64,
    },
    /// A torrent was removed from the catalog.
    TorrentRemoved { hash: InfoHash },
    /// Transfer settings were applied and sessions restarted.
    SettingsApplied,
    /// The active stream gateway was stopped.
    StreamStopped,
    /// Server heartbeat (sent periodically to keep connection alive).
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::MetadataReady { .. } => "metadata_ready",
            WsMessage::TorrentRemoved { .. } => "torrent_removed",
            WsMessage::SettingsApplied => "settings_applied",
            WsMessage::StreamStopped => "stream_stopped",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

impl From<MetadataReady> for WsMessage {
    fn from(event: MetadataReady) -> Self {
        WsMessage::MetadataReady {
            hash: event.hash,
            title: event.title,
            peers: event.peers,
            seeders: event.seeders,
            file_count: event.file_count,
            total_size: event.total_size,
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    pub fn torrent_removed(&self, hash: InfoHash) {
        self.broadcast(WsMessage::TorrentRemoved { hash });
    }

    /// Forward manager metadata events and emit heartbeats until the
    /// manager's event channel closes.
    pub fn spawn_forwarder(&self, manager: &TorrentManager) -> JoinHandle<()> {
        let broadcaster = self.clone();
        let mut events = manager.subscribe();

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            loop {
                tokio::select! {
                    result = events.recv() => match result {
                        Ok(event) => broadcaster.broadcast(event.into()),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Event forwarder lagged, skipped {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Metadata event channel closed");
                            break;
                        }
                    },
                    _ = heartbeat.tick() => {
                        broadcaster.broadcast(WsMessage::Heartbeat {
                            timestamp: chrono::Utc::now().timestamp(),
                        });
                    }
                }
            }
        })
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();

                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize WsMessage: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Only close and errors matter from the client side
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
