use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swarmcast_core::{
    load_config, validate_config, CommandPlayer, GatewaySlot, LibrqbitEngine, Player,
    SqliteCatalog, SwarmEngine, TorrentCatalog, TorrentManager,
};
use swarmcast_server::api::{create_router, WsBroadcaster};
use swarmcast_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("SWARMCAST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    if config.read_only {
        warn!("Read-only mode: catalog changes will be refused");
    }

    let catalog: Arc<dyn TorrentCatalog> = Arc::new(
        SqliteCatalog::new(&config.database.path).context("Failed to open torrent catalog")?,
    );
    info!("Torrent catalog initialized");

    info!(
        "Initializing embedded librqbit engine (download path: {:?})",
        config.engine.download_path
    );
    let engine: Arc<dyn SwarmEngine> = Arc::new(
        LibrqbitEngine::new(config.engine.clone(), config.transfer.clone())
            .await
            .context("Failed to start swarm engine")?,
    );

    let slot = Arc::new(GatewaySlot::new(config.stream.clone()));
    let manager = Arc::new(TorrentManager::new(
        catalog,
        engine,
        slot,
        config.lifecycle.clone(),
        config.transfer.clone(),
        config.read_only,
    ));

    let reaper = manager.spawn_reaper();
    if config.lifecycle.restore_on_start {
        match manager.restore() {
            Ok(count) => info!("Restoring {} torrents in the background", count),
            Err(e) => warn!("Failed to restore torrents: {}", e),
        }
    }

    let player: Arc<dyn Player> = Arc::new(CommandPlayer::new(config.player.clone()));
    info!("Player: {}", config.player.program);

    let ws_broadcaster = WsBroadcaster::default();
    let forwarder = ws_broadcaster.spawn_forwarder(&manager);

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&manager),
        player,
        ws_broadcaster,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    manager.shutdown().await;
    forwarder.abort();
    let _ = reaper.await;
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
