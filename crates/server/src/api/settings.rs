//! Transfer settings handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use swarmcast_core::{ReconfigureOutcome, TransferSettings};
use tracing::info;

use super::error::{ApiError, OutcomeResponse};
use super::ws::WsMessage;
use crate::state::AppState;

/// GET /api/v1/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<TransferSettings> {
    Json(state.manager().settings().await)
}

/// PUT /api/v1/settings
///
/// Apply new settings. Every live session is closed and the engine
/// restarted before this returns.
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<TransferSettings>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let outcome = state.manager().reconfigure(settings).await?;
    if outcome == ReconfigureOutcome::Applied {
        info!("Settings applied via API");
        state.ws_broadcaster().broadcast(WsMessage::SettingsApplied);
    }
    Ok(OutcomeResponse::new(outcome.as_str()))
}
