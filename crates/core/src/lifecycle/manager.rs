//! Torrent lifecycle manager.
//!
//! Reconciles the durable catalog with live swarm sessions:
//! - Add/resolve join the swarm without waiting for metadata
//! - A background watch per handle upgrades the record once metadata arrives
//! - Idle handles are evicted from memory; the catalog keeps them
//! - Reconfigure is a barrier that restarts every session

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::LifecycleConfig;
use super::events::{MetadataEvents, MetadataReady};
use super::handle::{HandleTable, TorrentHandle};
use super::types::{
    sort_views, ManagerError, ReconfigureOutcome, RemoveOutcome, TorrentDetails,
    TorrentFileView, TorrentStatsView, TorrentView, UpdateOutcome,
};
use crate::catalog::{CatalogError, TorrentCatalog, TorrentRecord};
use crate::config::{validate_transfer_settings, TransferSettings};
use crate::metrics;
use crate::player::Player;
use crate::stream::GatewaySlot;
use crate::swarm::SwarmEngine;
use crate::torrent::{InfoHash, TorrentInput};

/// Upper bound on how long an idle handle stays resident.
const MAX_IDLE_TTL: Duration = Duration::from_secs(60);

/// Owns every in-memory torrent handle and coordinates the catalog, the
/// swarm engine and the stream gateway.
pub struct TorrentManager {
    catalog: Arc<dyn TorrentCatalog>,
    engine: Arc<dyn SwarmEngine>,
    slot: Arc<GatewaySlot>,
    config: LifecycleConfig,
    read_only: bool,
    settings: RwLock<TransferSettings>,
    handles: HandleTable,
    /// Add, remove, resolve and update hold the read side; reconfigure
    /// holds the write side.
    barrier: RwLock<()>,
    events: MetadataEvents,
    shutdown_tx: broadcast::Sender<()>,
}

impl TorrentManager {
    pub fn new(
        catalog: Arc<dyn TorrentCatalog>,
        engine: Arc<dyn SwarmEngine>,
        slot: Arc<GatewaySlot>,
        config: LifecycleConfig,
        settings: TransferSettings,
        read_only: bool,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            catalog,
            engine,
            slot,
            config,
            read_only,
            settings: RwLock::new(settings),
            handles: HandleTable::new(),
            barrier: RwLock::new(()),
            events: MetadataEvents::new(),
            shutdown_tx,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn slot(&self) -> &Arc<GatewaySlot> {
        &self.slot
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Current transfer settings.
    pub async fn settings(&self) -> TransferSettings {
        self.settings.read().await.clone()
    }

    /// New receiver for metadata-ready events.
    pub fn subscribe(&self) -> broadcast::Receiver<MetadataReady> {
        self.events.subscribe()
    }

    /// Number of handles resident in memory.
    pub async fn resident_count(&self) -> usize {
        self.handles.len().await
    }

    /// Add a torrent. Returns as soon as the swarm is joined and the
    /// provisional record is written; metadata resolves in the background.
    pub async fn add(
        &self,
        input: TorrentInput,
        details: TorrentDetails,
    ) -> Result<TorrentView, ManagerError> {
        let kind = input.kind();
        let spec = input.into_spec()?;
        let hash = spec.info_hash;

        let _barrier = self.barrier.read().await;

        let existing = match self.catalog.get(&hash) {
            Ok(record) => Some(record),
            Err(CatalogError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let mut record = TorrentRecord::provisional(spec.clone(), Utc::now().timestamp());
        if let Some(ref existing) = existing {
            record.title = existing.title.clone();
            record.poster = existing.poster.clone();
            record.category = existing.category.clone();
            record.data = existing.data.clone();
            record.size_bytes = existing.size_bytes;
            record.file_count = existing.file_count;
            record.timestamp = existing.timestamp;
            if record.title.is_empty() {
                record.title = spec.display_name.clone().unwrap_or_default();
            }
        }
        details.apply_to(&mut record);

        let handle = self.obtain(record).await?;
        if !details.is_empty() {
            handle.apply_details(&details);
        }

        if self.read_only {
            debug!(hash = %hash, "Read-only mode, not persisting added torrent");
        } else {
            handle.persist(self.catalog.as_ref())?;
        }

        metrics::TORRENTS_ADDED.with_label_values(&[kind]).inc();
        info!(hash = %hash, kind, "Torrent added");

        Ok(handle.view())
    }

    /// Catalog and resident handles merged; a resident handle wins.
    pub async fn list(&self) -> Result<Vec<TorrentView>, ManagerError> {
        let _barrier = self.barrier.read().await;

        let records = self.catalog.list()?;
        let mut views: HashMap<InfoHash, TorrentView> = records
            .iter()
            .map(|record| (record.hash, TorrentView::from_record(record)))
            .collect();
        for handle in self.handles.handles().await {
            views.insert(handle.hash(), handle.view());
        }

        let mut views: Vec<TorrentView> = views.into_values().collect();
        sort_views(&mut views);
        Ok(views)
    }

    /// Resident handle, or one rebuilt from the catalog. Extends the idle
    /// deadline either way.
    pub async fn resolve(&self, hash: &InfoHash) -> Result<Arc<TorrentHandle>, ManagerError> {
        let _barrier = self.barrier.read().await;
        self.resolve_unlocked(hash).await
    }

    async fn resolve_unlocked(&self, hash: &InfoHash) -> Result<Arc<TorrentHandle>, ManagerError> {
        if let Some(handle) = self.handles.get(hash).await {
            handle.extend(self.idle_ttl().await);
            return Ok(handle);
        }

        let record = match self.catalog.get(hash) {
            Ok(record) => record,
            Err(CatalogError::NotFound(_)) => {
                return Err(ManagerError::NotFound(format!("torrent {}", hash)))
            }
            Err(e) => return Err(e.into()),
        };
        self.obtain(record).await
    }

    /// Get or create the handle for a record's hash. Concurrent callers for
    /// the same hash share one engine join.
    async fn obtain(&self, record: TorrentRecord) -> Result<Arc<TorrentHandle>, ManagerError> {
        let hash = record.hash;
        let cell = self.handles.cell(&hash).await;

        let mut created = false;
        let created_flag = &mut created;
        let engine = self.engine.clone();
        let result = cell
            .get_or_try_init(|| async move {
                let session = engine.join(&record.spec).await?;
                *created_flag = true;
                Ok::<_, ManagerError>(Arc::new(TorrentHandle::new(record, session)))
            })
            .await;

        let handle = match result {
            Ok(handle) => handle.clone(),
            Err(e) => {
                self.handles.discard(&hash, &cell).await;
                warn!(hash = %hash, error = %e, "Failed to join swarm");
                return Err(e);
            }
        };

        if created {
            if !self.handles.holds(&hash, &cell).await {
                // Removed while the join was in flight
                handle.signal_shutdown();
                if let Err(e) = handle.session().close(false).await {
                    warn!(hash = %hash, error = %e, "Failed to close orphaned session");
                }
                return Err(ManagerError::NotFound(format!("torrent {}", hash)));
            }

            metrics::HANDLES_RESIDENT.inc();
            debug!(hash = %hash, engine = self.engine.name(), "Handle created");
            self.spawn_metadata_watch(handle.clone());
        }

        handle.extend(self.idle_ttl().await);
        Ok(handle)
    }

    fn spawn_metadata_watch(&self, handle: Arc<TorrentHandle>) {
        let shutdown = handle.subscribe_shutdown();
        handle.set_watching(true);
        tokio::spawn(watch_metadata(
            handle,
            self.catalog.clone(),
            self.events.clone(),
            self.config.clone(),
            self.read_only,
            shutdown,
        ));
    }

    /// Delete the record and tear down the live session, waiting for the
    /// engine to acknowledge. Removing an unknown hash reports `NotFound`.
    pub async fn remove(&self, hash: &InfoHash) -> Result<RemoveOutcome, ManagerError> {
        if self.read_only {
            info!(hash = %hash, "Read-only mode, ignoring remove");
            return Ok(RemoveOutcome::ReadOnly);
        }

        let _barrier = self.barrier.read().await;

        let handle = self.handles.take(hash).await;
        let had_handle = handle.is_some();
        if let Some(ref handle) = handle {
            handle.seal();
        }

        let had_record = self.catalog.delete(hash)?;

        if let Some(handle) = handle {
            self.slot.stop_for(hash).await;
            close_handle(&handle, true).await;
        }

        if had_record || had_handle {
            metrics::TORRENTS_REMOVED.inc();
            info!(hash = %hash, "Torrent removed");
            Ok(RemoveOutcome::Removed)
        } else {
            debug!(hash = %hash, "Nothing to remove");
            Ok(RemoveOutcome::NotFound)
        }
    }

    /// Evict a handle from memory. The catalog record stays.
    pub async fn drop_handle(&self, hash: &InfoHash) -> bool {
        let _barrier = self.barrier.read().await;

        match self.handles.take(hash).await {
            Some(handle) => {
                self.slot.stop_for(hash).await;
                close_handle(&handle, false).await;
                info!(hash = %hash, "Handle dropped");
                true
            }
            None => false,
        }
    }

    /// Apply new transfer settings. Stops the stream, closes every session
    /// and waits for each, then restarts the engine. Blocks other
    /// operations for its duration.
    pub async fn reconfigure(
        &self,
        settings: TransferSettings,
    ) -> Result<ReconfigureOutcome, ManagerError> {
        if self.read_only {
            info!("Read-only mode, ignoring reconfigure");
            return Ok(ReconfigureOutcome::ReadOnly);
        }
        validate_transfer_settings(&settings)
            .map_err(|e| ManagerError::InvalidInput(e.to_string()))?;

        let _barrier = self.barrier.write().await;
        info!("Reconfiguring transfer settings");

        self.slot.stop().await;

        let handles = self.handles.drain().await;
        let count = handles.len();
        join_all(handles.iter().map(|h| close_handle(h, false))).await;
        debug!(count, "All sessions closed");

        self.engine.reconfigure(&settings).await?;
        *self.settings.write().await = settings;

        info!(closed = count, "Transfer settings applied");
        Ok(ReconfigureOutcome::Applied)
    }

    /// Edit user details on both the handle and the record.
    pub async fn update_details(
        &self,
        hash: &InfoHash,
        details: TorrentDetails,
    ) -> Result<UpdateOutcome, ManagerError> {
        if self.read_only {
            info!(hash = %hash, "Read-only mode, ignoring update");
            return Ok(UpdateOutcome::ReadOnly);
        }

        let _barrier = self.barrier.read().await;

        let view = match self.handles.get(hash).await {
            Some(handle) => {
                handle.apply_details(&details);
                handle.persist(self.catalog.as_ref())?;
                handle.view()
            }
            None => {
                let mut record = match self.catalog.get(hash) {
                    Ok(record) => record,
                    Err(CatalogError::NotFound(_)) => {
                        return Err(ManagerError::NotFound(format!("torrent {}", hash)))
                    }
                    Err(e) => return Err(e.into()),
                };
                details.apply_to(&mut record);
                self.catalog.put(&record)?;
                TorrentView::from_record(&record)
            }
        };

        debug!(hash = %hash, "Torrent details updated");
        Ok(UpdateOutcome::Updated(view))
    }

    /// Files sorted by path, with 1-based indexes in metadata order.
    pub async fn files(&self, hash: &InfoHash) -> Result<Vec<TorrentFileView>, ManagerError> {
        let handle = self.resolve(hash).await?;
        let session = handle.session();
        if !session.metadata_ready() {
            return Err(ManagerError::MetadataPending(*hash));
        }

        let mut files: Vec<TorrentFileView> = session
            .files()
            .into_iter()
            .enumerate()
            .map(|(i, f)| TorrentFileView {
                index: i + 1,
                path: f.path,
                size: f.length,
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    pub async fn stats(&self, hash: &InfoHash) -> Result<TorrentStatsView, ManagerError> {
        let handle = self.resolve(hash).await?;
        let session = handle.session();
        let stats = session.stats();
        let cache = session.cache().observe();

        Ok(TorrentStatsView {
            hash: *hash,
            peers: stats.peers,
            seeders: stats.seeders,
            download_rate: stats.download_rate,
            upload_rate: stats.upload_rate,
            downloaded: stats.downloaded,
            total: stats.total,
            progress: stats.progress_percent(),
            cache_filled: cache.filled,
            cache_capacity: cache.capacity,
        })
    }

    /// Stream a file to `player` and block until playback ends. The file
    /// index is 1-based.
    pub async fn play_file(
        &self,
        hash: &InfoHash,
        file_index: usize,
        player: &dyn Player,
    ) -> Result<(), ManagerError> {
        let (handle, gateway, _stream) = {
            let _barrier = self.barrier.read().await;

            let handle = self.resolve_unlocked(hash).await?;
            let session = handle.session();
            if !session.metadata_ready() {
                return Err(ManagerError::MetadataPending(*hash));
            }
            let count = session.files().len();
            if file_index == 0 || file_index > count {
                return Err(ManagerError::NotFound(format!(
                    "file {} in torrent {} ({} files)",
                    file_index, hash, count
                )));
            }

            let stream = handle.acquire_stream();
            let percent = self.settings.read().await.preload_percent;
            let gateway = self.slot.start(session, file_index - 1, percent).await?;
            (handle, gateway, stream)
        };

        let result = match gateway.wait_ready().await {
            Ok(()) => {
                info!(hash = %hash, file_index, url = %gateway.url(), "Starting playback");
                player.play(&gateway.url()).await.map_err(ManagerError::from)
            }
            Err(e) => Err(e.into()),
        };

        self.slot.stop_session(&gateway).await;
        handle.extend(self.idle_ttl().await);

        match result {
            Ok(()) => info!(hash = %hash, file_index, "Playback finished"),
            Err(ref e) => warn!(hash = %hash, file_index, error = %e, "Playback failed"),
        }
        result
    }

    /// Rejoin every catalog entry in the background so metadata events
    /// fire as swarms answer. Returns how many were scheduled.
    pub fn restore(self: &Arc<Self>) -> Result<usize, ManagerError> {
        let records = self.catalog.list()?;
        let count = records.len();
        info!(count, "Restoring torrents from catalog");

        for record in records {
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(e) = manager.resolve(&record.hash).await {
                    warn!(hash = %record.hash, error = %e, "Failed to restore torrent");
                }
            });
        }
        Ok(count)
    }

    /// Periodically evict handles idle past their deadline. Stops on
    /// `shutdown`.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_secs(self.config.reaper_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Handle reaper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.reap().await;
                    }
                }
            }
        })
    }

    /// Evict idle handles now. Returns how many were evicted.
    pub async fn reap(&self) -> usize {
        let evicted = self.handles.evict_expired(Instant::now()).await;
        let count = evicted.len();
        for handle in evicted {
            debug!(hash = %handle.hash(), "Evicting idle handle");
            close_handle(&handle, false).await;
            metrics::HANDLES_EVICTED.inc();
        }
        count
    }

    /// Stop background tasks, the stream and every session. Files are kept.
    pub async fn shutdown(&self) {
        info!("Shutting down torrent manager");
        let _ = self.shutdown_tx.send(());

        let _barrier = self.barrier.write().await;
        self.slot.stop().await;
        let handles = self.handles.drain().await;
        join_all(handles.iter().map(|h| close_handle(h, false))).await;
        info!(closed = handles.len(), "Torrent manager stopped");
    }

    async fn idle_ttl(&self) -> Duration {
        let secs = self.settings.read().await.disconnect_timeout_secs;
        Duration::from_secs(secs).min(MAX_IDLE_TTL)
    }
}

/// Signal a handle's tasks and close its session, waiting for the engine.
async fn close_handle(handle: &TorrentHandle, delete_files: bool) {
    handle.signal_shutdown();
    if let Err(e) = handle.session().close(delete_files).await {
        error!(hash = %handle.hash(), error = %e, "Failed to close swarm session");
    }
    metrics::HANDLES_RESIDENT.dec();
}

/// Poll the session until metadata arrives, the deadline passes, or the
/// handle shuts down. On success, upgrade the handle and the record and
/// publish one event.
async fn watch_metadata(
    handle: Arc<TorrentHandle>,
    catalog: Arc<dyn TorrentCatalog>,
    events: MetadataEvents,
    config: LifecycleConfig,
    read_only: bool,
    mut shutdown: broadcast::Receiver<()>,
) {
    let hash = handle.hash();
    let session = handle.session();
    let started = Instant::now();
    let deadline = started + Duration::from_secs(config.metadata_timeout_secs);
    let poll = Duration::from_millis(config.metadata_poll_interval_ms.max(1));

    loop {
        if handle.is_closed() {
            watch_cancelled(&handle);
            return;
        }
        if session.metadata_ready() {
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            handle.set_watching(false);
            metrics::METADATA_RESOLUTIONS
                .with_label_values(&["timeout"])
                .inc();
            info!(
                hash = %hash,
                timeout_secs = config.metadata_timeout_secs,
                "Metadata not received in time, keeping provisional data"
            );
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(poll.min(deadline - now)) => {}
            _ = shutdown.recv() => {}
        }
    }

    let files = session.files();
    let total_size: u64 = files.iter().map(|f| f.length).sum();
    let file_count = files.len() as u32;
    handle.apply_metadata(session.name(), total_size, file_count);
    handle.mark_metadata_ready();

    if !read_only {
        match handle.persist(catalog.as_ref()) {
            Ok(true) => {}
            Ok(false) => {
                watch_cancelled(&handle);
                return;
            }
            Err(e) => warn!(hash = %hash, error = %e, "Failed to persist metadata"),
        }
    }

    let stats = session.stats();
    let record = handle.to_record();
    let event = MetadataReady {
        hash,
        title: record.title.clone(),
        peers: stats.peers,
        seeders: stats.seeders,
        file_count,
        total_size,
    };
    // A concurrent remove either sees the event published or stops it here
    if handle.while_open(|| events.publish(event)).is_none() {
        watch_cancelled(&handle);
        return;
    }
    handle.set_watching(false);

    let waited = started.elapsed();
    metrics::METADATA_WAIT
        .with_label_values(&[])
        .observe(waited.as_secs_f64());
    metrics::METADATA_RESOLUTIONS
        .with_label_values(&["ready"])
        .inc();
    info!(
        hash = %hash,
        title = %record.title,
        file_count,
        total_size,
        waited_ms = waited.as_millis() as u64,
        "Metadata ready"
    );
}

fn watch_cancelled(handle: &TorrentHandle) {
    handle.set_watching(false);
    metrics::METADATA_RESOLUTIONS
        .with_label_values(&["cancelled"])
        .inc();
    debug!(hash = %handle.hash(), "Metadata watch cancelled");
}
