//! In-memory torrent handles and the table that owns them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, OnceCell, RwLock};

use super::types::{TorrentDetails, TorrentStatus, TorrentView};
use crate::catalog::{CatalogError, TorrentCatalog, TorrentRecord};
use crate::swarm::SwarmSession;
use crate::torrent::InfoHash;

/// A torrent resident in memory, wrapping its live swarm session.
pub struct TorrentHandle {
    hash: InfoHash,
    session: Arc<dyn SwarmSession>,
    /// Mirror of the catalog record.
    record: StdRwLock<TorrentRecord>,
    metadata_ready: AtomicBool,
    watching: AtomicBool,
    expires_at: Mutex<Instant>,
    active_streams: AtomicUsize,
    closed: AtomicBool,
    /// Serializes record writes with `seal`.
    write_lock: Mutex<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TorrentHandle {
    pub fn new(record: TorrentRecord, session: Arc<dyn SwarmSession>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            hash: record.hash,
            session,
            record: StdRwLock::new(record),
            metadata_ready: AtomicBool::new(false),
            watching: AtomicBool::new(false),
            expires_at: Mutex::new(Instant::now()),
            active_streams: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            shutdown_tx,
        }
    }

    pub fn hash(&self) -> InfoHash {
        self.hash
    }

    pub fn session(&self) -> Arc<dyn SwarmSession> {
        self.session.clone()
    }

    /// Snapshot of the mirrored record.
    pub fn to_record(&self) -> TorrentRecord {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn apply_details(&self, details: &TorrentDetails) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        details.apply_to(&mut record);
    }

    /// Fold swarm metadata into the record. A title the user already set wins.
    pub fn apply_metadata(&self, name: Option<String>, size_bytes: u64, file_count: u32) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        if record.title.is_empty() {
            record.title = name.unwrap_or_else(|| self.hash.short());
        }
        record.size_bytes = size_bytes;
        record.file_count = file_count;
    }

    /// Write the mirrored record to the catalog. Returns false without
    /// writing once the handle is sealed.
    pub fn persist(&self, catalog: &dyn TorrentCatalog) -> Result<bool, CatalogError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Ok(false);
        }
        catalog.put(&self.to_record())?;
        Ok(true)
    }

    /// Run `f` unless the handle is sealed. `seal` waits for a running `f`.
    pub fn while_open<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return None;
        }
        Some(f())
    }

    /// Signal shutdown such that no `persist` or `while_open` runs after
    /// this returns.
    pub fn seal(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.signal_shutdown();
    }

    pub fn is_metadata_ready(&self) -> bool {
        self.metadata_ready.load(Ordering::Acquire)
    }

    pub fn mark_metadata_ready(&self) {
        self.metadata_ready.store(true, Ordering::Release);
    }

    pub fn set_watching(&self, watching: bool) {
        self.watching.store(watching, Ordering::Release);
    }

    /// Push the idle deadline to `ttl` from now.
    pub fn extend(&self, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        let mut expires_at = self.expires_at.lock().unwrap_or_else(PoisonError::into_inner);
        if deadline > *expires_at {
            *expires_at = deadline;
        }
    }

    /// Idle past its deadline with no stream using it.
    pub fn is_evictable(&self, now: Instant) -> bool {
        let expires_at = *self.expires_at.lock().unwrap_or_else(PoisonError::into_inner);
        now >= expires_at && self.active_streams() == 0
    }

    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::Acquire)
    }

    /// Mark the handle as streaming until the guard is dropped.
    pub fn acquire_stream(self: &Arc<Self>) -> StreamGuard {
        self.active_streams.fetch_add(1, Ordering::AcqRel);
        StreamGuard {
            handle: self.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Tell background tasks to stop. Tasks that subscribe later see
    /// `is_closed`.
    pub fn signal_shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn view(&self) -> TorrentView {
        let record = self.to_record();
        let stats = self.session.stats();
        let ready = self.is_metadata_ready();
        TorrentView {
            hash: self.hash,
            title: record.title,
            name: self.session.name().or(record.spec.display_name),
            poster: record.poster,
            category: record.category,
            size_bytes: record.size_bytes,
            file_count: record.file_count,
            timestamp: record.timestamp,
            data: record.data,
            status: if ready {
                TorrentStatus::Ready
            } else {
                TorrentStatus::Loading
            },
            loading_meta: self.watching.load(Ordering::Acquire),
            progress: stats.progress_percent(),
            peers: stats.peers,
            seeders: stats.seeders,
            download_rate: stats.download_rate,
            upload_rate: stats.upload_rate,
            live: true,
        }
    }
}

/// Keeps a handle from being evicted while a stream is playing.
pub struct StreamGuard {
    handle: Arc<TorrentHandle>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.handle.active_streams.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Slot for one hash. Empty while the first join is in flight, so
/// concurrent callers for the same hash wait on one join instead of
/// starting a second.
pub(crate) type HandleCell = Arc<OnceCell<Arc<TorrentHandle>>>;

/// Hash to handle map. The lock is only held for map operations, never
/// across engine or catalog I/O.
#[derive(Default)]
pub struct HandleTable {
    cells: RwLock<HashMap<InfoHash, HandleCell>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resident handle, if its join has completed.
    pub async fn get(&self, hash: &InfoHash) -> Option<Arc<TorrentHandle>> {
        self.cells
            .read()
            .await
            .get(hash)
            .and_then(|cell| cell.get().cloned())
    }

    /// The cell for `hash`, inserting an empty one if absent.
    pub(crate) async fn cell(&self, hash: &InfoHash) -> HandleCell {
        if let Some(cell) = self.cells.read().await.get(hash) {
            return cell.clone();
        }
        self.cells
            .write()
            .await
            .entry(*hash)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Whether `cell` is still the table's entry for `hash`.
    pub(crate) async fn holds(&self, hash: &InfoHash, cell: &HandleCell) -> bool {
        self.cells
            .read()
            .await
            .get(hash)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
    }

    /// Drop an entry whose join failed, unless someone has since filled or
    /// replaced it.
    pub(crate) async fn discard(&self, hash: &InfoHash, cell: &HandleCell) {
        let mut cells = self.cells.write().await;
        if cells
            .get(hash)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized())
        {
            cells.remove(hash);
        }
    }

    /// Remove the entry for `hash`, returning its handle if it had one.
    pub async fn take(&self, hash: &InfoHash) -> Option<Arc<TorrentHandle>> {
        self.cells
            .write()
            .await
            .remove(hash)
            .and_then(|cell| cell.get().cloned())
    }

    /// Remove every entry, returning the resident handles.
    pub async fn drain(&self) -> Vec<Arc<TorrentHandle>> {
        self.cells
            .write()
            .await
            .drain()
            .filter_map(|(_, cell)| cell.get().cloned())
            .collect()
    }

    /// Remove and return the handles that are evictable at `now`.
    pub async fn evict_expired(&self, now: Instant) -> Vec<Arc<TorrentHandle>> {
        let mut cells = self.cells.write().await;
        let expired: Vec<InfoHash> = cells
            .iter()
            .filter(|(_, cell)| cell.get().is_some_and(|h| h.is_evictable(now)))
            .map(|(hash, _)| *hash)
            .collect();
        expired
            .iter()
            .filter_map(|hash| cells.remove(hash))
            .filter_map(|cell| cell.get().cloned())
            .collect()
    }

    /// All resident handles.
    pub async fn handles(&self) -> Vec<Arc<TorrentHandle>> {
        self.cells
            .read()
            .await
            .values()
            .filter_map(|cell| cell.get().cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.cells
            .read()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSwarmSession;
    use crate::torrent::TorrentSpec;

    fn handle(n: u8) -> Arc<TorrentHandle> {
        let spec = TorrentSpec::from_hash(InfoHash::from_bytes([n; 20]));
        let session = Arc::new(MockSwarmSession::pending(spec.info_hash, 1024));
        Arc::new(TorrentHandle::new(TorrentRecord::provisional(spec, 0), session))
    }

    async fn insert(table: &HandleTable, handle: Arc<TorrentHandle>) {
        let cell = table.cell(&handle.hash()).await;
        assert!(cell.set(handle).is_ok());
    }

    #[test]
    fn test_metadata_keeps_user_title() {
        let h = handle(1);
        h.apply_details(&TorrentDetails {
            title: Some("Mine".to_string()),
            ..Default::default()
        });
        h.apply_metadata(Some("From swarm".to_string()), 4096, 2);

        let record = h.to_record();
        assert_eq!(record.title, "Mine");
        assert_eq!(record.size_bytes, 4096);
        assert_eq!(record.file_count, 2);
    }

    #[test]
    fn test_metadata_title_falls_back_to_short_hash() {
        let h = handle(0xab);
        h.apply_metadata(None, 1, 1);
        assert_eq!(h.to_record().title, "abababab");
    }

    #[test]
    fn test_stream_guard_blocks_eviction() {
        let h = handle(1);
        let now = Instant::now() + Duration::from_secs(1);
        assert!(h.is_evictable(now));

        let guard = h.acquire_stream();
        assert_eq!(h.active_streams(), 1);
        assert!(!h.is_evictable(now));

        drop(guard);
        assert!(h.is_evictable(now));
    }

    #[test]
    fn test_extend_never_shortens() {
        let h = handle(1);
        h.extend(Duration::from_secs(60));
        h.extend(Duration::from_secs(1));
        assert!(!h.is_evictable(Instant::now() + Duration::from_secs(30)));
    }

    #[test]
    fn test_sealed_handle_does_not_persist() {
        let catalog = crate::catalog::SqliteCatalog::in_memory().unwrap();
        let h = handle(1);
        assert!(h.persist(&catalog).unwrap());
        assert!(catalog.exists(&h.hash()).unwrap());

        catalog.delete(&h.hash()).unwrap();
        h.seal();
        assert!(!h.persist(&catalog).unwrap());
        assert!(!catalog.exists(&h.hash()).unwrap());
    }

    #[test]
    fn test_while_open_skips_sealed_handle() {
        let h = handle(1);
        assert_eq!(h.while_open(|| 7), Some(7));
        h.seal();
        assert_eq!(h.while_open(|| 7), None);
    }

    #[test]
    fn test_signal_shutdown_marks_closed() {
        let h = handle(1);
        let mut rx = h.subscribe_shutdown();
        assert!(!h.is_closed());
        h.signal_shutdown();
        assert!(h.is_closed());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_table_take_and_drain() {
        let table = HandleTable::new();
        insert(&table, handle(1)).await;
        insert(&table, handle(2)).await;
        assert_eq!(table.len().await, 2);

        let taken = table.take(&InfoHash::from_bytes([1; 20])).await;
        assert!(taken.is_some());
        assert!(table.take(&InfoHash::from_bytes([1; 20])).await.is_none());

        let drained = table.drain().await;
        assert_eq!(drained.len(), 1);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_cell_is_not_resident() {
        let table = HandleTable::new();
        let hash = InfoHash::from_bytes([3; 20]);
        let cell = table.cell(&hash).await;

        assert!(table.get(&hash).await.is_none());
        assert_eq!(table.len().await, 0);
        assert!(table.holds(&hash, &cell).await);

        table.discard(&hash, &cell).await;
        assert!(!table.holds(&hash, &cell).await);
    }

    #[tokio::test]
    async fn test_evict_expired_skips_streaming_handles() {
        let table = HandleTable::new();
        let idle = handle(1);
        let busy = handle(2);
        let _guard = busy.acquire_stream();
        insert(&table, idle.clone()).await;
        insert(&table, busy.clone()).await;

        let evicted = table
            .evict_expired(Instant::now() + Duration::from_secs(1))
            .await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].hash(), idle.hash());
        assert!(table.get(&busy.hash()).await.is_some());
    }
}
