//! Torrent lifecycle API handlers.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use swarmcast_core::{
    lifecycle::{TorrentFileView, TorrentStatsView},
    RemoveOutcome, TorrentDetails, TorrentInput, TorrentView, UpdateOutcome,
};
use tracing::info;

use super::error::{parse_hash, ApiError, OutcomeResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddTorrentRequest {
    /// Magnet URI, bare info hash, or path to a local `.torrent` file.
    pub input: String,
    #[serde(flatten)]
    pub details: TorrentDetails,
}

#[derive(Debug, Serialize)]
pub struct TorrentListResponse {
    pub torrents: Vec<TorrentView>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<TorrentFileView>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DropResponse {
    pub dropped: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/torrents
///
/// Catalog entries merged with live state, newest first.
pub async fn list_torrents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TorrentListResponse>, ApiError> {
    let torrents = state.manager().list().await?;
    let count = torrents.len();
    Ok(Json(TorrentListResponse { torrents, count }))
}

/// POST /api/v1/torrents/add/magnet
///
/// Add a torrent from a magnet URI, info hash or local file path. Returns
/// before swarm metadata is known.
pub async fn add_magnet(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddTorrentRequest>,
) -> Result<Json<TorrentView>, ApiError> {
    let input = TorrentInput::detect(&body.input);
    let view = state.manager().add(input, body.details).await?;
    Ok(Json(view))
}

/// POST /api/v1/torrents/add/file
///
/// Add a torrent from an uploaded `.torrent` file. Text fields `title`,
/// `poster`, `category` and `data` set the details.
pub async fn add_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TorrentView>, ApiError> {
    let mut torrent_data: Option<Vec<u8>> = None;
    let mut details = TorrentDetails::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(ApiError::bad_request(format!("Invalid multipart body: {}", e))),
        };

        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?;
            torrent_data = Some(bytes.to_vec());
            continue;
        }

        let slot = match name.as_str() {
            "title" => &mut details.title,
            "poster" => &mut details.poster,
            "category" => &mut details.category,
            "data" => &mut details.data,
            _ => continue,
        };
        let text = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read field {}: {}", name, e)))?;
        *slot = Some(text);
    }

    let data = torrent_data.ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;
    let view = state
        .manager()
        .add(TorrentInput::TorrentFile(data), details)
        .await?;
    Ok(Json(view))
}

/// GET /api/v1/torrents/{hash}
pub async fn get_torrent(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<TorrentView>, ApiError> {
    let hash = parse_hash(&hash)?;
    let handle = state.manager().resolve(&hash).await?;
    Ok(Json(handle.view()))
}

/// PATCH /api/v1/torrents/{hash}
pub async fn update_torrent(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Json(details): Json<TorrentDetails>,
) -> Result<Response, ApiError> {
    let hash = parse_hash(&hash)?;
    match state.manager().update_details(&hash, details).await? {
        UpdateOutcome::Updated(view) => Ok(Json(view).into_response()),
        UpdateOutcome::ReadOnly => Ok(OutcomeResponse::new("read_only").into_response()),
    }
}

/// DELETE /api/v1/torrents/{hash}
///
/// Remove from the catalog and delete downloaded data. Returns after the
/// session has been torn down.
pub async fn remove_torrent(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let hash = parse_hash(&hash)?;
    let outcome = state.manager().remove(&hash).await?;
    match outcome {
        RemoveOutcome::Removed => {
            info!(hash = %hash, "Torrent removed via API");
            state.ws_broadcaster().torrent_removed(hash);
        }
        RemoveOutcome::NotFound => {
            return Err(ApiError::not_found(format!("Torrent not found: {}", hash)));
        }
        RemoveOutcome::ReadOnly => {}
    }
    Ok(OutcomeResponse::new(outcome.as_str()))
}

/// POST /api/v1/torrents/{hash}/drop
///
/// Evict the live session from memory. The catalog entry stays.
pub async fn drop_torrent(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<DropResponse>, ApiError> {
    let hash = parse_hash(&hash)?;
    let dropped = state.manager().drop_handle(&hash).await;
    Ok(Json(DropResponse { dropped }))
}

/// GET /api/v1/torrents/{hash}/files
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<FileListResponse>, ApiError> {
    let hash = parse_hash(&hash)?;
    let files = state.manager().files(&hash).await?;
    let count = files.len();
    Ok(Json(FileListResponse { files, count }))
}

/// GET /api/v1/torrents/{hash}/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<TorrentStatsView>, ApiError> {
    let hash = parse_hash(&hash)?;
    Ok(Json(state.manager().stats(&hash).await?))
}

/// POST /api/v1/torrents/{hash}/files/{index}/play
///
/// Stream a file to the configured player. Blocks until playback ends.
/// The index is 1-based, as returned by the files endpoint.
pub async fn play_file(
    State(state): State<Arc<AppState>>,
    Path((hash, index)): Path<(String, usize)>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let hash = parse_hash(&hash)?;
    state
        .manager()
        .play_file(&hash, index, state.player())
        .await?;
    Ok(OutcomeResponse::new("finished"))
}
