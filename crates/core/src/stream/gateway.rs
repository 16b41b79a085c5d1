//! Single-file HTTP range server with a pre-playback buffering gate.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::Stream;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::range::{parse_range, RangeRequest};
use super::{GatewayState, StreamConfig, StreamError, StreamSessionInfo};
use crate::cache::{preload, PieceCache};
use crate::metrics;
use crate::swarm::{ByteRange, SwarmFile, SwarmSession};
use crate::torrent::InfoHash;

/// Path of the single route a gateway serves.
pub const STREAM_PATH: &str = "/stream";

/// What the HTTP handlers need; shared by every request on one gateway.
struct Shared {
    session: Arc<dyn SwarmSession>,
    file_index: usize,
    file: SwarmFile,
    chunk_size: usize,
    state: watch::Receiver<GatewayState>,
}

impl Shared {
    fn is_closing(&self) -> bool {
        *self.state.borrow() >= GatewayState::Closing
    }
}

/// One playback session: a bound local endpoint for one file of one torrent.
pub struct StreamGateway {
    id: Uuid,
    hash: InfoHash,
    file_index: usize,
    file: SwarmFile,
    addr: SocketAddr,
    config: StreamConfig,
    state_tx: Arc<watch::Sender<GatewayState>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    server: Mutex<Option<JoinHandle<()>>>,
    gate: Mutex<Option<JoinHandle<()>>>,
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl StreamGateway {
    /// Bind an ephemeral local port, start serving, schedule the preload,
    /// and begin buffering. Returns in `Buffering`; use `wait_ready` to
    /// block until playback can start.
    pub async fn start(
        session: Arc<dyn SwarmSession>,
        file_index: usize,
        preload_percent: i32,
        config: StreamConfig,
    ) -> Result<Arc<Self>, StreamError> {
        let hash = session.info_hash();
        let files = session.files();
        let file = files
            .get(file_index)
            .cloned()
            .ok_or(StreamError::FileNotFound {
                hash,
                index: file_index,
            })?;

        let (state_tx, state_rx) = watch::channel(GatewayState::Binding);
        let state_tx = Arc::new(state_tx);

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|e| StreamError::ResourceExhausted(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| StreamError::ResourceExhausted(e.to_string()))?;

        let shared = Arc::new(Shared {
            session: session.clone(),
            file_index,
            file: file.clone(),
            chunk_size: config.chunk_size.max(1),
            state: state_rx,
        });
        let app = Router::new()
            .route(STREAM_PATH, get(stream_handler))
            .with_state(shared);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Stream server error");
            }
        });

        let id = Uuid::new_v4();
        info!(
            session_id = %id,
            hash = %hash,
            file_index,
            path = %file.path,
            addr = %addr,
            "Stream gateway bound"
        );

        let cache = session.cache();
        cache.begin_window(file_index, 0);
        preload(session.as_ref(), file_index, preload_percent);

        state_tx.send_replace(GatewayState::Buffering);
        let gate = tokio::spawn(buffer_gate(
            cache,
            state_tx.clone(),
            config.clone(),
        ));

        metrics::STREAM_SESSIONS.inc();
        metrics::STREAM_SESSIONS_ACTIVE.inc();

        Ok(Arc::new(Self {
            id,
            hash,
            file_index,
            file,
            addr,
            config,
            state_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            server: Mutex::new(Some(server)),
            gate: Mutex::new(Some(gate)),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn hash(&self) -> InfoHash {
        self.hash
    }

    pub fn file_index(&self) -> usize {
        self.file_index
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL a player should open.
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, STREAM_PATH)
    }

    pub fn state(&self) -> GatewayState {
        *self.state_tx.borrow()
    }

    /// Receiver for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<GatewayState> {
        self.state_tx.subscribe()
    }

    pub fn info(&self) -> StreamSessionInfo {
        StreamSessionInfo {
            id: self.id,
            hash: self.hash,
            file_index: self.file_index,
            path: self.file.path.clone(),
            length: self.file.length,
            url: self.url(),
            state: self.state(),
        }
    }

    /// Wait until the gateway is serving. Fails if it is stopped first.
    pub async fn wait_ready(&self) -> Result<(), StreamError> {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|s| *s >= GatewayState::Serving)
            .await
            .map(|s| *s)
            .map_err(|_| StreamError::Closed)?;
        if state == GatewayState::Serving {
            Ok(())
        } else {
            Err(StreamError::Closed)
        }
    }

    /// Drive the gateway through `Closing` to `Closed`. In-flight responses
    /// get the configured grace period before the server is aborted.
    /// Concurrent callers all return once `Closed` is reached.
    pub async fn stop(&self) {
        let began = self.state_tx.send_if_modified(|state| {
            if *state < GatewayState::Closing {
                *state = GatewayState::Closing;
                true
            } else {
                false
            }
        });
        if !began {
            let mut rx = self.subscribe();
            let _ = rx.wait_for(|s| *s == GatewayState::Closed).await;
            return;
        }

        debug!(session_id = %self.id, hash = %self.hash, "Stream gateway closing");

        if let Some(gate) = take(&self.gate) {
            gate.abort();
        }
        if let Some(tx) = take(&self.shutdown_tx) {
            let _ = tx.send(());
        }
        if let Some(mut server) = take(&self.server) {
            let grace = Duration::from_millis(self.config.shutdown_grace_ms);
            if tokio::time::timeout(grace, &mut server).await.is_err() {
                warn!(
                    session_id = %self.id,
                    grace_ms = self.config.shutdown_grace_ms,
                    "Stream server did not drain in time, aborting"
                );
                server.abort();
                let _ = server.await;
            }
        }

        self.state_tx.send_replace(GatewayState::Closed);
        metrics::STREAM_SESSIONS_ACTIVE.dec();
        info!(session_id = %self.id, hash = %self.hash, "Stream gateway closed");
    }
}

impl Drop for StreamGateway {
    fn drop(&mut self) {
        // Dropped without `stop`: release the port and the gate task.
        if let Some(gate) = take(&self.gate) {
            gate.abort();
        }
        if let Some(tx) = take(&self.shutdown_tx) {
            let _ = tx.send(());
            self.state_tx.send_replace(GatewayState::Closed);
            metrics::STREAM_SESSIONS_ACTIVE.dec();
        }
    }
}

/// Poll the cache until the floor is met or the deadline passes, then move
/// `Buffering -> Serving`. The floor is clamped to the cache capacity.
async fn buffer_gate(
    cache: Arc<PieceCache>,
    state_tx: Arc<watch::Sender<GatewayState>>,
    config: StreamConfig,
) {
    let started = Instant::now();
    let deadline = started + Duration::from_millis(config.max_buffer_wait_ms);
    let poll = Duration::from_millis(config.buffer_poll_interval_ms.max(1));
    let floor = config.min_buffer_bytes.min(cache.capacity());

    let outcome = loop {
        let state = cache.observe();
        if state.filled >= floor {
            break "filled";
        }
        let now = Instant::now();
        if now >= deadline {
            break "timeout";
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    };

    let waited = started.elapsed();
    metrics::BUFFER_WAIT
        .with_label_values(&[outcome])
        .observe(waited.as_secs_f64());

    let serving = state_tx.send_if_modified(|state| {
        if *state == GatewayState::Buffering {
            *state = GatewayState::Serving;
            true
        } else {
            false
        }
    });
    if serving {
        let filled = cache.observe().filled;
        info!(
            outcome,
            filled,
            floor,
            waited_ms = waited.as_millis() as u64,
            "Buffering finished, serving"
        );
    }
}

async fn stream_handler(State(shared): State<Arc<Shared>>, headers: HeaderMap) -> Response {
    let mut state = shared.state.clone();
    let ready = state
        .wait_for(|s| *s >= GatewayState::Serving)
        .await
        .map(|s| *s == GatewayState::Serving)
        .unwrap_or(false);
    if !ready {
        return (StatusCode::SERVICE_UNAVAILABLE, "stream closed").into_response();
    }

    let length = shared.file.length;
    let range_header = headers.get(header::RANGE).and_then(|h| h.to_str().ok());
    let request = parse_range(range_header, length);

    if request == RangeRequest::Unsatisfiable {
        debug!(range = ?range_header, length, "Unsatisfiable range");
        return (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [
                (header::CONTENT_RANGE, format!("bytes */{}", length)),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
        )
            .into_response();
    }

    let content_type = mime_guess::from_path(&shared.file.path)
        .first_or_octet_stream()
        .to_string();

    let Some((start, end)) = request.bounds(length) else {
        return (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_LENGTH, "0".to_string()),
            ],
        )
            .into_response();
    };

    // A request at a new offset is a seek: move the window and reprioritize.
    let cache = shared.session.cache();
    cache.retarget(start);
    shared
        .session
        .prioritize(shared.file_index, ByteRange::new(start, end + 1));

    debug!(start, end, length, "Serving range");
    let body = Body::from_stream(body_stream(shared.clone(), start, end + 1));
    let content_length = (end - start + 1).to_string();

    match request {
        RangeRequest::Partial { .. } => (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::CONTENT_TYPE, content_type),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_LENGTH, content_length),
                (
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, length),
                ),
            ],
            body,
        )
            .into_response(),
        _ => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_LENGTH, content_length),
            ],
            body,
        )
            .into_response(),
    }
}

/// Stream `[start, end)` of the file in chunk-sized engine reads. Stops
/// emitting as soon as the gateway starts closing.
fn body_stream(
    shared: Arc<Shared>,
    start: u64,
    end: u64,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    futures::stream::try_unfold(start, move |offset| {
        let shared = shared.clone();
        async move {
            if offset >= end {
                return Ok(None);
            }
            if shared.is_closing() {
                return Err(closed_error());
            }

            let want = ((end - offset) as usize).min(shared.chunk_size);
            let mut state = shared.state.clone();
            let chunk = tokio::select! {
                read = shared.session.read_at(shared.file_index, offset, want) => {
                    read.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
                }
                _ = state.wait_for(|s| *s >= GatewayState::Closing) => {
                    return Err(closed_error());
                }
            };

            if shared.is_closing() {
                return Err(closed_error());
            }
            if chunk.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "engine returned no data",
                ));
            }

            metrics::STREAM_BYTES_SERVED.inc_by(chunk.len() as u64);
            let next = offset + chunk.len() as u64;
            Ok(Some((chunk, next)))
        }
    })
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "stream gateway closed")
}
