//! Stream gateway handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use swarmcast_core::stream::StreamSessionInfo;

use super::error::ApiError;
use super::ws::WsMessage;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StopStreamResponse {
    pub stopped: bool,
}

/// GET /api/v1/stream
///
/// The active stream session.
pub async fn get_stream(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StreamSessionInfo>, ApiError> {
    state
        .manager()
        .slot()
        .info()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No active stream"))
}

/// POST /api/v1/stream/stop
pub async fn stop_stream(State(state): State<Arc<AppState>>) -> Json<StopStreamResponse> {
    let stopped = state.manager().slot().stop().await;
    if stopped {
        state.ws_broadcaster().broadcast(WsMessage::StreamStopped);
    }
    Json(StopStreamResponse { stopped })
}
