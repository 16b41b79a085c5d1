use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, settings, stream, torrents, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Torrents
        .route("/torrents", get(torrents::list_torrents))
        .route("/torrents/add/magnet", post(torrents::add_magnet))
        .route("/torrents/add/file", post(torrents::add_file))
        .route(
            "/torrents/{hash}",
            get(torrents::get_torrent)
                .patch(torrents::update_torrent)
                .delete(torrents::remove_torrent),
        )
        .route("/torrents/{hash}/drop", post(torrents::drop_torrent))
        .route("/torrents/{hash}/files", get(torrents::list_files))
        .route("/torrents/{hash}/stats", get(torrents::get_stats))
        .route(
            "/torrents/{hash}/files/{index}/play",
            post(torrents::play_file),
        )
        // Stream gateway
        .route("/stream", get(stream::get_stream))
        .route("/stream/stop", post(stream::stop_stream))
        // Transfer settings
        .route(
            "/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        // Event feed
        .route("/events", get(ws::ws_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
}
