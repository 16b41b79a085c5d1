//! Mock swarm engine for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::PieceCache;
use crate::config::TransferSettings;
use crate::swarm::{ByteRange, SwarmEngine, SwarmError, SwarmFile, SwarmSession, SwarmStats};
use crate::torrent::{InfoHash, TorrentSpec};

/// Content byte at `offset` of file `file_index`. Mock sessions serve this
/// pattern so tests can check exactly which bytes were returned.
pub fn pattern_byte(file_index: usize, offset: u64) -> u8 {
    ((offset % 251) as u8).wrapping_add(file_index as u8)
}

/// `len` pattern bytes starting at `offset`.
pub fn pattern_bytes(file_index: usize, offset: u64, len: u64) -> Vec<u8> {
    (offset..offset + len)
        .map(|o| pattern_byte(file_index, o))
        .collect()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct SessionState {
    name: Option<String>,
    files: Vec<SwarmFile>,
    /// Metadata becomes visible at this instant; never when `None`.
    ready_at: Option<Instant>,
    hints: Vec<(usize, ByteRange)>,
    stats: SwarmStats,
    read_delay: Duration,
    close_delay: Duration,
    /// `Some(delete_files)` once closed.
    closed: Option<bool>,
}

/// Mock implementation of [`SwarmSession`].
///
/// Serves [`pattern_byte`] content, feeds the piece cache on every read,
/// and records priority hints and closes for assertions.
#[derive(Debug)]
pub struct MockSwarmSession {
    hash: InfoHash,
    cache: Arc<PieceCache>,
    state: Mutex<SessionState>,
    reads: AtomicUsize,
}

impl MockSwarmSession {
    /// A session whose metadata is available immediately.
    pub fn new(hash: InfoHash, name: &str, files: Vec<SwarmFile>, cache_capacity: u64) -> Self {
        Self::build(
            hash,
            Some(name.to_string()),
            files,
            Some(Instant::now()),
            cache_capacity,
        )
    }

    /// A session whose metadata never arrives unless `mark_ready` is called.
    pub fn pending(hash: InfoHash, cache_capacity: u64) -> Self {
        Self::build(hash, None, Vec::new(), None, cache_capacity)
    }

    /// A ready session with one file, `movie.mkv`, of `file_len` bytes.
    pub fn single_file(cache_capacity: u64, file_len: u64) -> Self {
        Self::new(
            InfoHash::from_bytes([0xab; 20]),
            "movie",
            vec![SwarmFile {
                path: "movie.mkv".to_string(),
                length: file_len,
            }],
            cache_capacity,
        )
    }

    fn build(
        hash: InfoHash,
        name: Option<String>,
        files: Vec<SwarmFile>,
        ready_at: Option<Instant>,
        cache_capacity: u64,
    ) -> Self {
        let total = files.iter().map(|f| f.length).sum();
        Self {
            hash,
            cache: Arc::new(PieceCache::new(cache_capacity)),
            state: Mutex::new(SessionState {
                name,
                files,
                ready_at,
                hints: Vec::new(),
                stats: SwarmStats {
                    total,
                    ..Default::default()
                },
                read_delay: Duration::ZERO,
                close_delay: Duration::ZERO,
                closed: None,
            }),
            reads: AtomicUsize::new(0),
        }
    }

    /// Deliver metadata now.
    pub fn mark_ready(&self, name: &str, files: Vec<SwarmFile>) {
        let mut state = lock(&self.state);
        state.stats.total = files.iter().map(|f| f.length).sum();
        state.name = Some(name.to_string());
        state.files = files;
        state.ready_at = Some(Instant::now());
    }

    pub fn priority_hints(&self) -> Vec<(usize, ByteRange)> {
        lock(&self.state).hints.clone()
    }

    pub fn set_stats(&self, stats: SwarmStats) {
        lock(&self.state).stats = stats;
    }

    /// Delay every read, simulating a slow swarm.
    pub fn set_read_delay(&self, delay: Duration) {
        lock(&self.state).read_delay = delay;
    }

    /// Delay the close acknowledgement.
    pub fn set_close_delay(&self, delay: Duration) {
        lock(&self.state).close_delay = delay;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed.is_some()
    }

    /// `Some(delete_files)` if the session was closed.
    pub fn closed_with(&self) -> Option<bool> {
        lock(&self.state).closed
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwarmSession for MockSwarmSession {
    fn info_hash(&self) -> InfoHash {
        self.hash
    }

    fn metadata_ready(&self) -> bool {
        lock(&self.state)
            .ready_at
            .is_some_and(|at| Instant::now() >= at)
    }

    fn name(&self) -> Option<String> {
        if self.metadata_ready() {
            lock(&self.state).name.clone()
        } else {
            None
        }
    }

    fn files(&self) -> Vec<SwarmFile> {
        if self.metadata_ready() {
            lock(&self.state).files.clone()
        } else {
            Vec::new()
        }
    }

    async fn read_at(
        &self,
        file_index: usize,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, SwarmError> {
        if !self.metadata_ready() {
            return Err(SwarmError::MetadataPending(self.hash));
        }
        let (length, delay) = {
            let state = lock(&self.state);
            if state.closed.is_some() {
                return Err(SwarmError::Unavailable("session closed".to_string()));
            }
            let file = state
                .files
                .get(file_index)
                .ok_or(SwarmError::FileOutOfRange {
                    index: file_index,
                    count: state.files.len(),
                })?;
            (file.length, state.read_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.reads.fetch_add(1, Ordering::SeqCst);

        if offset >= length {
            return Ok(Bytes::new());
        }
        let end = offset.saturating_add(len as u64).min(length);
        let data = pattern_bytes(file_index, offset, end - offset);
        self.cache.record(file_index, offset, data.len() as u64);
        Ok(Bytes::from(data))
    }

    fn prioritize(&self, file_index: usize, range: ByteRange) {
        lock(&self.state).hints.push((file_index, range));
    }

    fn stats(&self) -> SwarmStats {
        lock(&self.state).stats
    }

    fn cache(&self) -> Arc<PieceCache> {
        self.cache.clone()
    }

    async fn close(&self, delete_files: bool) -> Result<(), SwarmError> {
        let delay = lock(&self.state).close_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock(&self.state).closed = Some(delete_files);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MockTorrent {
    name: String,
    files: Vec<SwarmFile>,
    metadata_delay: Duration,
}

/// Mock implementation of [`SwarmEngine`].
///
/// Hashes registered with [`MockSwarmEngine::register`] resolve metadata
/// (optionally after a delay); anything else joins but never resolves.
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockSwarmEngine::new();
/// engine.register(fixtures::hash(1), "Movie", fixtures::video_files());
///
/// let session = engine.join(&TorrentSpec::from_hash(fixtures::hash(1))).await?;
/// assert!(session.metadata_ready());
/// assert_eq!(engine.join_count(), 1);
/// ```
#[derive(Debug)]
pub struct MockSwarmEngine {
    torrents: Mutex<HashMap<InfoHash, MockTorrent>>,
    /// Every session ever created, in join order.
    sessions: Mutex<Vec<Arc<MockSwarmSession>>>,
    joins: AtomicUsize,
    join_delay: Mutex<Duration>,
    fail_joins: AtomicBool,
    cache_capacity: AtomicU64,
    reconfigurations: Mutex<Vec<TransferSettings>>,
}

impl Default for MockSwarmEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSwarmEngine {
    pub fn new() -> Self {
        Self::with_cache_capacity(TransferSettings::default().cache_size)
    }

    pub fn with_cache_capacity(cache_capacity: u64) -> Self {
        Self {
            torrents: Mutex::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            joins: AtomicUsize::new(0),
            join_delay: Mutex::new(Duration::ZERO),
            fail_joins: AtomicBool::new(false),
            cache_capacity: AtomicU64::new(cache_capacity),
            reconfigurations: Mutex::new(Vec::new()),
        }
    }

    /// Make `hash` resolvable with the given metadata.
    pub fn register(&self, hash: InfoHash, name: &str, files: Vec<SwarmFile>) {
        self.register_delayed(hash, name, files, Duration::ZERO);
    }

    /// Like `register`, but metadata only appears `delay` after each join.
    pub fn register_delayed(
        &self,
        hash: InfoHash,
        name: &str,
        files: Vec<SwarmFile>,
        delay: Duration,
    ) {
        lock(&self.torrents).insert(
            hash,
            MockTorrent {
                name: name.to_string(),
                files,
                metadata_delay: delay,
            },
        );
    }

    /// Delay every join.
    pub fn set_join_delay(&self, delay: Duration) {
        *lock(&self.join_delay) = delay;
    }

    /// Make joins fail until reset.
    pub fn set_fail_joins(&self, fail: bool) {
        self.fail_joins.store(fail, Ordering::SeqCst);
    }

    pub fn join_count(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    /// Most recent session for `hash`.
    pub fn session(&self, hash: &InfoHash) -> Option<Arc<MockSwarmSession>> {
        lock(&self.sessions)
            .iter()
            .rev()
            .find(|s| s.hash == *hash)
            .cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<MockSwarmSession>> {
        lock(&self.sessions).clone()
    }

    /// Sessions that are still open.
    pub fn open_sessions(&self) -> usize {
        lock(&self.sessions)
            .iter()
            .filter(|s| !s.is_closed())
            .count()
    }

    pub fn reconfigurations(&self) -> Vec<TransferSettings> {
        lock(&self.reconfigurations).clone()
    }
}

#[async_trait]
impl SwarmEngine for MockSwarmEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn join(&self, spec: &TorrentSpec) -> Result<Arc<dyn SwarmSession>, SwarmError> {
        let delay = *lock(&self.join_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(SwarmError::Unavailable("mock join failure".to_string()));
        }
        self.joins.fetch_add(1, Ordering::SeqCst);

        let hash = spec.info_hash;
        let capacity = self.cache_capacity.load(Ordering::SeqCst);
        let torrent = lock(&self.torrents).get(&hash).cloned();
        let session = match torrent {
            Some(t) => MockSwarmSession::build(
                hash,
                Some(t.name),
                t.files,
                Some(Instant::now() + t.metadata_delay),
                capacity,
            ),
            None => MockSwarmSession::pending(hash, capacity),
        };

        let session = Arc::new(session);
        lock(&self.sessions).push(session.clone());
        Ok(session)
    }

    async fn reconfigure(&self, settings: &TransferSettings) -> Result<(), SwarmError> {
        self.cache_capacity
            .store(settings.cache_size, Ordering::SeqCst);
        lock(&self.reconfigurations).push(settings.clone());
        Ok(())
    }
}
