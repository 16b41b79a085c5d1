//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that builds the full router in
//! process, with a mock swarm engine and a mock player behind a real
//! `TorrentManager` and an on-disk SQLite catalog.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use swarmcast_core::{
    lifecycle::LifecycleConfig,
    testing::{MockPlayer, MockSwarmEngine},
    Config, GatewaySlot, Player, SqliteCatalog, StreamConfig, SwarmEngine, TorrentCatalog,
    TorrentManager, TransferSettings,
};
use swarmcast_server::api::{create_router, WsBroadcaster};
use swarmcast_server::state::AppState;

/// Re-export fixtures for test convenience
pub use swarmcast_core::testing::fixtures;

const MIB: u64 = 1024 * 1024;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_add() {
///     let fixture = TestFixture::new().await;
///     fixture.engine.register(fixtures::hash(1), "Movie", fixtures::video_files());
///
///     let response = fixture.post("/api/v1/torrents/add/magnet", json!({
///         "input": fixtures::hash(1).to_hex()
///     })).await;
///
///     assert_eq!(response.status, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    /// Mock engine - register torrents, inspect sessions
    pub engine: Arc<MockSwarmEngine>,
    /// Mock player - control playback
    pub player: Arc<MockPlayer>,
    pub manager: Arc<TorrentManager>,
    pub ws_broadcaster: WsBroadcaster,
    /// Holds the catalog database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Default)]
pub struct TestConfig {
    pub read_only: bool,
    /// Player keeps playing until `finish` is called.
    pub holding_player: bool,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config {
            read_only: test_config.read_only,
            ..Config::default()
        };
        config.database.path = db_path.clone();
        config.lifecycle = LifecycleConfig {
            metadata_poll_interval_ms: 10,
            metadata_timeout_secs: 2,
            reaper_interval_secs: 1,
            restore_on_start: false,
        };
        config.stream = StreamConfig {
            buffer_poll_interval_ms: 10,
            min_buffer_bytes: 0,
            max_buffer_wait_ms: 100,
            shutdown_grace_ms: 200,
            chunk_size: 64 * 1024,
        };
        config.transfer = TransferSettings {
            cache_size: MIB,
            ..TransferSettings::default()
        };

        let catalog: Arc<dyn TorrentCatalog> =
            Arc::new(SqliteCatalog::new(&db_path).expect("Failed to create catalog"));
        let engine = Arc::new(MockSwarmEngine::with_cache_capacity(MIB));
        let player = Arc::new(if test_config.holding_player {
            MockPlayer::holding()
        } else {
            MockPlayer::new()
        });

        let manager = Arc::new(TorrentManager::new(
            catalog,
            Arc::clone(&engine) as Arc<dyn SwarmEngine>,
            Arc::new(GatewaySlot::new(config.stream.clone())),
            config.lifecycle.clone(),
            config.transfer.clone(),
            config.read_only,
        ));

        let ws_broadcaster = WsBroadcaster::default();
        ws_broadcaster.spawn_forwarder(&manager);

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&manager),
            Arc::clone(&player) as Arc<dyn Player>,
            ws_broadcaster.clone(),
        ));

        Self {
            router: create_router(state),
            engine,
            player,
            manager,
            ws_broadcaster,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a PATCH request with JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request_raw("POST", path, body.as_bytes().to_vec(), "application/json")
            .await
    }

    /// Send a multipart form. Each part is `(name, filename, bytes)`.
    pub async fn post_multipart(
        &self,
        path: &str,
        parts: &[(&str, Option<&str>, &[u8])],
    ) -> TestResponse {
        const BOUNDARY: &str = "swarmcast-test-boundary";

        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/x-bittorrent\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        self.request_raw(
            "POST",
            path,
            body,
            &format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .await
    }

    async fn request_raw(
        &self,
        method: &str,
        path: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned()))
        };

        TestResponse { status, body }
    }
}

/// Minimal single-file `.torrent` contents.
pub fn torrent_file(name: &str, length: u64) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"d4:infod6:lengthi");
    data.extend_from_slice(length.to_string().as_bytes());
    data.extend_from_slice(format!("e4:name{}:{}", name.len(), name).as_bytes());
    data.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
    data.extend_from_slice(&[0u8; 20]);
    data.extend_from_slice(b"ee");
    data
}
