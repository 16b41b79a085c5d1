//! librqbit embedded swarm engine implementation.

use std::io::SeekFrom;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use librqbit::limits::LimitsConfig;
use librqbit::{
    AddTorrent, AddTorrentOptions, ManagedTorrent, Session, SessionOptions,
    SessionPersistenceConfig,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ByteRange, SwarmEngine, SwarmError, SwarmFile, SwarmSession, SwarmStats};
use crate::cache::PieceCache;
use crate::config::{EngineConfig, TransferSettings};
use crate::torrent::{InfoHash, TorrentSpec};

/// Read size used by background prefetch tasks.
const PREFETCH_CHUNK: usize = 256 * 1024;

/// Embedded librqbit swarm engine.
pub struct LibrqbitEngine {
    config: EngineConfig,
    session: RwLock<Arc<Session>>,
    settings: RwLock<TransferSettings>,
}

impl LibrqbitEngine {
    /// Create a new librqbit engine from configuration.
    pub async fn new(
        config: EngineConfig,
        settings: TransferSettings,
    ) -> Result<Self, SwarmError> {
        let session = Self::open_session(&config, &settings).await?;
        Ok(Self {
            config,
            session: RwLock::new(session),
            settings: RwLock::new(settings),
        })
    }

    fn session_options(
        config: &EngineConfig,
        settings: &TransferSettings,
    ) -> Result<SessionOptions, SwarmError> {
        let mut opts = SessionOptions::default();

        if !config.enable_dht {
            opts.disable_dht = true;
        }

        // Range, not RangeInclusive
        if let Some(port) = config.listen_port {
            opts.listen_port_range = Some(port..(port + 1));
        }

        if let Some(ref persistence_dir) = config.persistence_path {
            ensure_dir(persistence_dir)?;
            opts.persistence = Some(SessionPersistenceConfig::Json {
                folder: Some(persistence_dir.clone()),
            });
        }

        opts.ratelimits = LimitsConfig {
            download_bps: rate_limit(settings.download_rate_limit),
            upload_bps: rate_limit(settings.upload_rate_limit),
        };

        Ok(opts)
    }

    async fn open_session(
        config: &EngineConfig,
        settings: &TransferSettings,
    ) -> Result<Arc<Session>, SwarmError> {
        ensure_dir(&config.download_path)?;
        let opts = Self::session_options(config, settings)?;

        if settings.connections_limit > 0 {
            warn!(
                limit = settings.connections_limit,
                "Connection limits not supported by librqbit"
            );
        }

        info!(
            download_path = %config.download_path.display(),
            dht_enabled = !opts.disable_dht,
            download_limit = settings.download_rate_limit,
            upload_limit = settings.upload_rate_limit,
            "Initializing librqbit session"
        );

        let session = Session::new_with_opts(config.download_path.clone(), opts)
            .await
            .map_err(|e| {
                SwarmError::Unavailable(format!("Failed to initialize librqbit session: {}", e))
            })?;

        if let Some(port) = session.tcp_listen_port() {
            info!(port = port, "librqbit listening on TCP port");
        }

        Ok(session)
    }
}

fn ensure_dir(path: &Path) -> Result<(), SwarmError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| {
            SwarmError::Unavailable(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// 0 means unlimited.
fn rate_limit(bytes_per_sec: u64) -> Option<NonZeroU32> {
    NonZeroU32::new(bytes_per_sec.min(u32::MAX as u64) as u32)
}

#[async_trait]
impl SwarmEngine for LibrqbitEngine {
    fn name(&self) -> &str {
        "librqbit"
    }

    async fn join(&self, spec: &TorrentSpec) -> Result<Arc<dyn SwarmSession>, SwarmError> {
        let session = self.session.read().await.clone();
        let cache_size = self.settings.read().await.cache_size;
        let hash = spec.info_hash;

        let add = match spec.torrent_bytes {
            Some(ref data) => AddTorrent::from_bytes(data.clone()),
            None => AddTorrent::from_url(spec.to_magnet()),
        };

        let slot: Arc<OnceCell<Arc<ManagedTorrent>>> = Arc::new(OnceCell::new());
        let task = {
            let session = session.clone();
            let slot = slot.clone();
            tokio::spawn(async move {
                let opts = AddTorrentOptions {
                    overwrite: true,
                    ..Default::default()
                };
                match session.add_torrent(add, Some(opts)).await {
                    Ok(response) => match response.into_handle() {
                        Some(handle) => {
                            debug!(hash = %hash, name = ?handle.name(), "Joined swarm");
                            let _ = slot.set(handle);
                        }
                        None => warn!(hash = %hash, "Torrent was added in list-only mode"),
                    },
                    Err(e) => warn!(hash = %hash, error = %e, "Failed to join swarm"),
                }
            })
        };

        Ok(Arc::new(LibrqbitSession {
            info_hash: hash,
            session,
            handle: slot,
            add_task: Mutex::new(Some(task)),
            prefetch_task: Mutex::new(None),
            cache: Arc::new(PieceCache::new(cache_size)),
        }))
    }

    async fn reconfigure(&self, settings: &TransferSettings) -> Result<(), SwarmError> {
        let mut session = self.session.write().await;
        info!("Restarting librqbit session with new transfer settings");
        session.stop().await;

        *session = Self::open_session(&self.config, settings).await?;
        *self.settings.write().await = settings.clone();
        Ok(())
    }
}

/// A torrent joined through librqbit. The managed torrent appears once the
/// background add completes (for magnets, after the info dictionary arrives).
struct LibrqbitSession {
    info_hash: InfoHash,
    session: Arc<Session>,
    handle: Arc<OnceCell<Arc<ManagedTorrent>>>,
    add_task: Mutex<Option<JoinHandle<()>>>,
    prefetch_task: Mutex<Option<JoinHandle<()>>>,
    cache: Arc<PieceCache>,
}

impl LibrqbitSession {
    fn managed(&self) -> Result<Arc<ManagedTorrent>, SwarmError> {
        self.handle
            .get()
            .cloned()
            .ok_or(SwarmError::MetadataPending(self.info_hash))
    }

    fn file_length(&self, file_index: usize) -> Result<u64, SwarmError> {
        let files = self.files();
        files
            .get(file_index)
            .map(|f| f.length)
            .ok_or(SwarmError::FileOutOfRange {
                index: file_index,
                count: files.len(),
            })
    }
}

/// Swap a background task into its slot, aborting whatever was there.
fn replace_task(slot: &Mutex<Option<JoinHandle<()>>>, task: Option<JoinHandle<()>>) {
    let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(previous) = std::mem::replace(&mut *guard, task) {
        previous.abort();
    }
}

#[async_trait]
impl SwarmSession for LibrqbitSession {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn metadata_ready(&self) -> bool {
        self.handle
            .get()
            .map(|h| h.metadata.load().is_some())
            .unwrap_or(false)
    }

    fn name(&self) -> Option<String> {
        self.handle
            .get()
            .and_then(|h| h.name().map(|s| s.to_string()))
    }

    fn files(&self) -> Vec<SwarmFile> {
        let Some(handle) = self.handle.get() else {
            return Vec::new();
        };
        let metadata = handle.metadata.load();
        let Some(meta) = &*metadata else {
            return Vec::new();
        };
        let files = match meta.info.iter_file_details() {
            Ok(details) => details
                .map(|f| SwarmFile {
                    path: f
                        .filename
                        .to_string()
                        .unwrap_or_else(|_| "<invalid utf-8>".to_string()),
                    length: f.len,
                })
                .collect(),
            Err(e) => {
                warn!(hash = %self.info_hash, error = %e, "Failed to read file list");
                Vec::new()
            }
        };
        files
    }

    async fn read_at(
        &self,
        file_index: usize,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, SwarmError> {
        let handle = self.managed()?;
        let length = self.file_length(file_index)?;
        if offset >= length {
            return Ok(Bytes::new());
        }
        let len = len.min((length - offset) as usize);

        let mut stream = handle
            .stream(file_index)
            .map_err(|e| SwarmError::Read(e.to_string()))?;
        stream
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| SwarmError::Read(e.to_string()))?;

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| SwarmError::Read(e.to_string()))?;

        self.cache.record(file_index, offset, len as u64);
        Ok(Bytes::from(buf))
    }

    fn prioritize(&self, file_index: usize, range: ByteRange) {
        let Ok(handle) = self.managed() else {
            debug!(hash = %self.info_hash, "Ignoring priority hint before metadata");
            return;
        };
        let range = match self.file_length(file_index) {
            Ok(length) => range.clamp_to(length),
            Err(e) => {
                warn!(hash = %self.info_hash, error = %e, "Ignoring priority hint");
                return;
            }
        };
        if range.is_empty() {
            return;
        }

        let hash = self.info_hash;
        let cache = self.cache.clone();
        // An open file stream makes librqbit fetch the pieces under its
        // cursor first; reading it through drives the range in order.
        let task = tokio::spawn(async move {
            let mut stream = match handle.stream(file_index) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(hash = %hash, error = %e, "Failed to open prefetch stream");
                    return;
                }
            };
            if let Err(e) = stream.seek(SeekFrom::Start(range.start)).await {
                warn!(hash = %hash, error = %e, "Failed to seek prefetch stream");
                return;
            }

            let mut offset = range.start;
            let mut buf = vec![0u8; PREFETCH_CHUNK];
            while offset < range.end {
                let want = ((range.end - offset) as usize).min(buf.len());
                match stream.read(&mut buf[..want]).await {
                    Ok(0) => break,
                    Ok(n) => {
                        cache.record(file_index, offset, n as u64);
                        offset += n as u64;
                    }
                    Err(e) => {
                        debug!(hash = %hash, error = %e, "Prefetch stopped");
                        break;
                    }
                }
            }
            debug!(hash = %hash, start = range.start, end = offset, "Prefetch finished");
        });

        replace_task(&self.prefetch_task, Some(task));
    }

    fn stats(&self) -> SwarmStats {
        let Some(handle) = self.handle.get() else {
            return SwarmStats::default();
        };
        let stats = handle.stats();

        // librqbit reports MiB/s in the `mbps` field
        let (download_rate, upload_rate, peers, seeders) = stats
            .live
            .as_ref()
            .map(|live| {
                let peer_stats = &live.snapshot.peer_stats;
                (
                    (live.download_speed.mbps * 1024.0 * 1024.0) as u64,
                    (live.upload_speed.mbps * 1024.0 * 1024.0) as u64,
                    (peer_stats.queued + peer_stats.connecting + peer_stats.live) as u32,
                    peer_stats.live as u32,
                )
            })
            .unwrap_or((0, 0, 0, 0));

        SwarmStats {
            peers,
            seeders,
            download_rate,
            upload_rate,
            downloaded: stats.progress_bytes,
            total: stats.total_bytes,
        }
    }

    fn cache(&self) -> Arc<PieceCache> {
        self.cache.clone()
    }

    async fn close(&self, delete_files: bool) -> Result<(), SwarmError> {
        replace_task(&self.prefetch_task, None);
        replace_task(&self.add_task, None);

        if let Some(handle) = self.handle.get() {
            self.session
                .delete(handle.id().into(), delete_files)
                .await
                .map_err(|e| SwarmError::Engine(format!("Failed to remove torrent: {}", e)))?;
        }

        debug!(hash = %self.info_hash, delete_files, "Swarm session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_zero_is_unlimited() {
        assert!(rate_limit(0).is_none());
        assert_eq!(rate_limit(1024).map(|v| v.get()), Some(1024));
        assert_eq!(rate_limit(u64::MAX).map(|v| v.get()), Some(u32::MAX));
    }

    #[test]
    fn test_session_options_mapping() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig {
            download_path: dir.path().join("downloads"),
            enable_dht: false,
            listen_port: Some(42000),
            persistence_path: None,
        };
        let settings = TransferSettings {
            download_rate_limit: 2048,
            ..Default::default()
        };

        let opts = LibrqbitEngine::session_options(&config, &settings).unwrap();
        assert!(opts.disable_dht);
        assert_eq!(opts.listen_port_range, Some(42000..42001));
        assert!(opts.persistence.is_none());
        assert_eq!(opts.ratelimits.download_bps.map(|v| v.get()), Some(2048));
        assert!(opts.ratelimits.upload_bps.is_none());
    }

    /// Single-file `.torrent` with one 16 KiB piece.
    fn single_file_torrent(name: &str) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"d4:infod6:lengthi16384e");
        data.extend_from_slice(format!("4:name{}:{}", name.len(), name).as_bytes());
        data.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
        data.extend_from_slice(&[0u8; 20]);
        data.extend_from_slice(b"ee");
        data
    }

    #[tokio::test]
    async fn test_files_listed_from_torrent_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig {
            download_path: dir.path().join("downloads"),
            enable_dht: false,
            listen_port: None,
            persistence_path: None,
        };
        let engine = LibrqbitEngine::new(config, TransferSettings::default())
            .await
            .unwrap();

        let spec = TorrentSpec::from_torrent_bytes(single_file_torrent("clip.mkv")).unwrap();
        let session = engine.join(&spec).await.unwrap();
        for _ in 0..100 {
            if session.metadata_ready() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        assert_eq!(
            session.files(),
            vec![SwarmFile {
                path: "clip.mkv".to_string(),
                length: 16384,
            }]
        );
        session.close(true).await.unwrap();
    }
}
