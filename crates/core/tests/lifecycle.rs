//! Lifecycle manager integration tests.
//!
//! These tests drive the manager against the mock swarm engine and an
//! on-disk SQLite catalog: add -> metadata -> list -> play -> remove.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;

use swarmcast_core::{
    catalog::TorrentCatalog,
    lifecycle::TorrentStatus,
    testing::{fixtures, MockPlayer, MockSwarmEngine},
    GatewaySlot, GatewayState, InfoHash, LifecycleConfig, ManagerError, ReconfigureOutcome,
    RemoveOutcome, SqliteCatalog, StreamConfig, TorrentDetails, TorrentInput, TorrentManager,
    TransferSettings, UpdateOutcome,
};

/// Test helper wiring a manager to mocks with fast timings.
struct TestHarness {
    manager: Arc<TorrentManager>,
    engine: Arc<MockSwarmEngine>,
    catalog: Arc<SqliteCatalog>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::build(false, TransferSettings::default())
    }

    fn read_only() -> Self {
        Self::build(true, TransferSettings::default())
    }

    fn build(read_only: bool, settings: TransferSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let catalog = Arc::new(
            SqliteCatalog::new(&temp_dir.path().join("catalog.db"))
                .expect("Failed to create catalog"),
        );
        let engine = Arc::new(MockSwarmEngine::with_cache_capacity(1024 * 1024));

        let lifecycle = LifecycleConfig {
            metadata_poll_interval_ms: 10,
            metadata_timeout_secs: 1,
            reaper_interval_secs: 1,
            restore_on_start: false,
        };
        let stream = StreamConfig {
            buffer_poll_interval_ms: 10,
            min_buffer_bytes: 64 * 1024,
            max_buffer_wait_ms: 200,
            shutdown_grace_ms: 200,
            chunk_size: 64 * 1024,
        };

        let manager = Arc::new(TorrentManager::new(
            catalog.clone(),
            engine.clone(),
            Arc::new(GatewaySlot::new(stream)),
            lifecycle,
            settings,
            read_only,
        ));

        Self {
            manager,
            engine,
            catalog,
            _temp_dir: temp_dir,
        }
    }

    /// Register `hash` with the engine and add it by magnet.
    async fn add_ready(&self, n: u8, name: &str) -> InfoHash {
        let hash = fixtures::hash(n);
        self.engine.register(hash, name, fixtures::video_files());
        self.manager
            .add(
                TorrentInput::Magnet(fixtures::magnet(&hash, name)),
                TorrentDetails::default(),
            )
            .await
            .expect("add failed");
        hash
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_add_then_resolve_and_list() {
    let h = TestHarness::new();
    let hash = h.add_ready(1, "Sintel").await;

    let handle = h.manager.resolve(&hash).await.unwrap();
    assert_eq!(handle.hash(), hash);

    let list = h.manager.list().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].hash, hash);
    assert!(list[0].live);

    // The provisional record is written before metadata arrives
    assert!(h.catalog.exists(&hash).unwrap());
}

#[tokio::test]
async fn test_add_returns_before_metadata() {
    let h = TestHarness::new();
    let hash = fixtures::hash(2);
    h.engine.register_delayed(
        hash,
        "Slow",
        fixtures::video_files(),
        Duration::from_millis(300),
    );

    let view = h
        .manager
        .add(TorrentInput::Hash(hash.to_hex()), TorrentDetails::default())
        .await
        .unwrap();
    assert_eq!(view.status, TorrentStatus::Loading);
    assert!(view.loading_meta);
    assert_eq!(view.file_count, 0);
}

#[tokio::test]
async fn test_concurrent_add_creates_one_handle() {
    let h = TestHarness::new();
    let hash = fixtures::hash(3);
    h.engine.register(hash, "Twice", fixtures::video_files());
    h.engine.set_join_delay(Duration::from_millis(100));

    let magnet = fixtures::magnet(&hash, "Twice");
    let (a, b) = tokio::join!(
        h.manager
            .add(TorrentInput::Magnet(magnet.clone()), TorrentDetails::default()),
        h.manager
            .add(TorrentInput::Magnet(magnet), TorrentDetails::default()),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.engine.join_count(), 1);
    assert_eq!(h.manager.resident_count().await, 1);
    let list = h.manager.list().await.unwrap();
    assert_eq!(list.iter().filter(|v| v.hash == hash).count(), 1);
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let h = TestHarness::new();
    let err = h
        .manager
        .add(
            TorrentInput::detect("not a magnet or hash"),
            TorrentDetails::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::InvalidInput(_)));
    assert_eq!(h.engine.join_count(), 0);
}

#[tokio::test]
async fn test_metadata_ready_fires_once_and_upgrades_record() {
    let h = TestHarness::new();
    let mut events = h.manager.subscribe();
    let hash = fixtures::hash(4);
    h.engine.register(hash, "Big Buck Bunny", fixtures::video_files());

    // No display name in a bare hash, so the title comes from metadata
    h.manager
        .add(TorrentInput::Hash(hash.to_hex()), TorrentDetails::default())
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no metadata event")
        .unwrap();
    assert_eq!(event.hash, hash);
    assert_eq!(event.title, "Big Buck Bunny");
    assert_eq!(event.file_count, 3);
    let expected_size: u64 = fixtures::video_files().iter().map(|f| f.length).sum();
    assert_eq!(event.total_size, expected_size);

    let record = h.catalog.get(&hash).unwrap();
    assert_eq!(record.title, "Big Buck Bunny");
    assert_eq!(record.file_count, 3);
    assert_eq!(record.size_bytes, expected_size);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_metadata_timeout_keeps_provisional_data() {
    let h = TestHarness::new();
    let mut events = h.manager.subscribe();
    let hash = fixtures::hash(5);

    h.manager
        .add(
            TorrentInput::Magnet(fixtures::magnet(&hash, "Nobody Seeds This")),
            TorrentDetails::default(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    let list = h.manager.list().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].title, "Nobody Seeds This");
    assert_eq!(list[0].status, TorrentStatus::Loading);
    assert!(!list[0].loading_meta);
}

#[tokio::test]
async fn test_remove_then_resolve_is_not_found() {
    let h = TestHarness::new();
    let hash = h.add_ready(6, "Gone").await;
    let session = h.engine.session(&hash).unwrap();

    let outcome = h.manager.remove(&hash).await.unwrap();
    assert_eq!(outcome, RemoveOutcome::Removed);
    // Close was acknowledged before remove returned
    assert_eq!(session.closed_with(), Some(true));

    assert!(matches!(
        h.manager.resolve(&hash).await,
        Err(ManagerError::NotFound(_))
    ));
    assert!(h.manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_waits_for_close_acknowledgement() {
    let h = TestHarness::new();
    let hash = h.add_ready(7, "Slow Close").await;
    let session = h.engine.session(&hash).unwrap();
    session.set_close_delay(Duration::from_millis(150));

    h.manager.remove(&hash).await.unwrap();
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_remove_twice_is_noop() {
    let h = TestHarness::new();
    let hash = h.add_ready(8, "Twice Removed").await;

    assert_eq!(h.manager.remove(&hash).await.unwrap(), RemoveOutcome::Removed);
    assert_eq!(h.manager.remove(&hash).await.unwrap(), RemoveOutcome::NotFound);
}

#[tokio::test]
async fn test_read_only_mutations_are_reported() {
    let h = TestHarness::read_only();
    let hash = h.add_ready(9, "Read Only").await;

    assert_eq!(h.manager.remove(&hash).await.unwrap(), RemoveOutcome::ReadOnly);
    assert_eq!(
        h.manager
            .reconfigure(TransferSettings::default())
            .await
            .unwrap(),
        ReconfigureOutcome::ReadOnly
    );
    assert_eq!(
        h.manager
            .update_details(&hash, TorrentDetails::default())
            .await
            .unwrap(),
        UpdateOutcome::ReadOnly
    );

    // Nothing was written, but the live handle still lists
    assert!(!h.catalog.exists(&hash).unwrap());
    assert_eq!(h.manager.list().await.unwrap().len(), 1);
    assert!(h.engine.reconfigurations().is_empty());
}

#[tokio::test]
async fn test_resolve_rebuilds_handle_from_catalog() {
    let h = TestHarness::new();
    let hash = h.add_ready(10, "Evicted").await;

    assert!(h.manager.drop_handle(&hash).await);
    assert_eq!(h.manager.resident_count().await, 0);
    assert_eq!(h.engine.session(&hash).unwrap().closed_with(), Some(false));

    // Catalog view while not resident
    let list = h.manager.list().await.unwrap();
    assert_eq!(list.len(), 1);
    assert!(!list[0].live);

    let handle = h.manager.resolve(&hash).await.unwrap();
    assert_eq!(handle.hash(), hash);
    assert_eq!(h.engine.join_count(), 2);
}

#[tokio::test]
async fn test_update_details_persists() {
    let h = TestHarness::new();
    let hash = h.add_ready(11, "Old Title").await;

    let outcome = h
        .manager
        .update_details(
            &hash,
            TorrentDetails {
                title: Some("New Title".to_string()),
                poster: Some("https://img.example/poster.jpg".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let UpdateOutcome::Updated(view) = outcome else {
        panic!("expected update");
    };
    assert_eq!(view.title, "New Title");

    let record = h.catalog.get(&hash).unwrap();
    assert_eq!(record.title, "New Title");
    assert_eq!(record.poster, "https://img.example/poster.jpg");

    let missing = h
        .manager
        .update_details(&fixtures::hash(99), TorrentDetails::default())
        .await;
    assert!(matches!(missing, Err(ManagerError::NotFound(_))));
}

#[tokio::test]
async fn test_add_applies_details_and_keeps_existing_ones() {
    let h = TestHarness::new();
    let hash = fixtures::hash(12);
    h.engine.register(hash, "Swarm Name", fixtures::video_files());

    h.manager
        .add(
            TorrentInput::Hash(hash.to_hex()),
            TorrentDetails {
                title: Some("My Title".to_string()),
                category: Some("movie".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.manager.drop_handle(&hash).await;

    // Re-adding without details keeps what the user set
    let view = h
        .manager
        .add(TorrentInput::Hash(hash.to_hex()), TorrentDetails::default())
        .await
        .unwrap();
    assert_eq!(view.title, "My Title");
    assert_eq!(view.category, "movie");
}

#[tokio::test]
async fn test_list_orders_by_timestamp_then_title() {
    let h = TestHarness::new();
    for (n, title, ts) in [(20u8, "Alpha", 100), (21, "Zulu", 100), (22, "Mid", 200)] {
        let mut record = swarmcast_core::TorrentRecord::provisional(
            swarmcast_core::TorrentSpec::from_hash(fixtures::hash(n)),
            ts,
        );
        record.title = title.to_string();
        h.catalog.put(&record).unwrap();
    }

    let titles: Vec<String> = h
        .manager
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.title)
        .collect();
    assert_eq!(titles, vec!["Mid", "Zulu", "Alpha"]);
}

#[tokio::test]
async fn test_files_sorted_with_one_based_index() {
    let h = TestHarness::new();
    let hash = h.add_ready(13, "Files").await;

    let files = h.manager.files(&hash).await.unwrap();
    let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "Movie/Sample/sample.mkv",
            "Movie/Subs/english.srt",
            "Movie/movie.mkv"
        ]
    );
    let indexes: Vec<_> = files.iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_files_pending_metadata() {
    let h = TestHarness::new();
    let hash = fixtures::hash(14);
    h.manager
        .add(TorrentInput::Hash(hash.to_hex()), TorrentDetails::default())
        .await
        .unwrap();

    assert!(matches!(
        h.manager.files(&hash).await,
        Err(ManagerError::MetadataPending(_))
    ));
}

#[tokio::test]
async fn test_stats_include_cache_state() {
    let h = TestHarness::new();
    let hash = h.add_ready(15, "Stats").await;

    let stats = h.manager.stats(&hash).await.unwrap();
    assert_eq!(stats.cache_capacity, 1024 * 1024);
    assert_eq!(stats.cache_filled, 0);
}

#[tokio::test]
async fn test_play_file_runs_player_and_closes_gateway() {
    let h = TestHarness::new();
    let hash = h.add_ready(16, "Play").await;
    let player = MockPlayer::new();

    h.manager.play_file(&hash, 1, &player).await.unwrap();

    let played = player.played();
    assert_eq!(played.len(), 1);
    assert!(played[0].starts_with("http://127.0.0.1:"));
    assert!(played[0].ends_with("/stream"));
    assert!(h.manager.slot().active().await.is_none());

    // Preload was scheduled for the chosen file
    let session = h.engine.session(&hash).unwrap();
    assert_eq!(session.priority_hints()[0].0, 0);
}

#[tokio::test]
async fn test_play_file_unknown_index() {
    let h = TestHarness::new();
    let hash = h.add_ready(17, "Index").await;
    let player = MockPlayer::new();

    for index in [0, 4] {
        let err = h.manager.play_file(&hash, index, &player).await.unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(_)), "index {}", index);
    }
    assert!(player.played().is_empty());
}

#[tokio::test]
async fn test_reconfigure_closes_serving_gateway() {
    let h = TestHarness::new();
    let hash = h.add_ready(18, "Reconfigure").await;
    let player = Arc::new(MockPlayer::holding());

    let manager = h.manager.clone();
    let playing = player.clone();
    let playback = tokio::spawn(async move { manager.play_file(&hash, 1, playing.as_ref()).await });

    player.wait_started().await;
    let gateway = h.manager.slot().active().await.expect("no active gateway");
    assert_eq!(gateway.state(), GatewayState::Serving);
    let url = gateway.url();

    let settings = TransferSettings {
        preload_percent: 10,
        ..Default::default()
    };
    let outcome = h.manager.reconfigure(settings.clone()).await.unwrap();
    assert_eq!(outcome, ReconfigureOutcome::Applied);

    assert_eq!(gateway.state(), GatewayState::Closed);
    assert!(reqwest::get(&url).await.is_err());
    assert_eq!(h.engine.open_sessions(), 0);
    assert_eq!(h.engine.reconfigurations(), vec![settings.clone()]);
    assert_eq!(h.manager.settings().await, settings);
    assert_eq!(h.manager.resident_count().await, 0);

    player.finish();
    playback.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconfigure_rejects_invalid_settings() {
    let h = TestHarness::new();
    let err = h
        .manager
        .reconfigure(TransferSettings {
            preload_percent: 150,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::InvalidInput(_)));
}

#[tokio::test]
async fn test_reconfigure_accepts_non_positive_preload() {
    let h = TestHarness::new();
    let settings = TransferSettings {
        preload_percent: -5,
        ..Default::default()
    };
    let outcome = h.manager.reconfigure(settings.clone()).await.unwrap();
    assert_eq!(outcome, ReconfigureOutcome::Applied);
    assert_eq!(h.manager.settings().await, settings);
}

#[tokio::test]
async fn test_reconfigure_blocks_add_and_remove_until_done() {
    let h = TestHarness::new();
    let first = h.add_ready(30, "Resident").await;
    let session = h.engine.session(&first).unwrap();
    session.set_close_delay(Duration::from_millis(300));

    let second = fixtures::hash(31);
    h.engine.register(second, "Latecomer", fixtures::video_files());

    let manager = h.manager.clone();
    let reconfigure =
        tokio::spawn(async move { manager.reconfigure(TransferSettings::default()).await });

    // Reconfigure now holds the barrier, waiting on the slow close
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!reconfigure.is_finished());
    assert!(h.engine.reconfigurations().is_empty());

    let add = async {
        let result = h
            .manager
            .add(
                TorrentInput::Magnet(fixtures::magnet(&second, "Latecomer")),
                TorrentDetails::default(),
            )
            .await;
        (result, h.engine.reconfigurations().len(), session.is_closed())
    };
    let remove = async {
        let result = h.manager.remove(&first).await;
        (result, h.engine.reconfigurations().len(), session.is_closed())
    };
    let ((added, add_saw, add_closed), (removed, remove_saw, remove_closed)) =
        tokio::join!(add, remove);

    // Both ran only after the engine was restarted
    added.unwrap();
    assert_eq!(add_saw, 1);
    assert!(add_closed);
    assert_eq!(removed.unwrap(), RemoveOutcome::Removed);
    assert_eq!(remove_saw, 1);
    assert!(remove_closed);

    assert_eq!(
        reconfigure.await.unwrap().unwrap(),
        ReconfigureOutcome::Applied
    );
    assert!(h.manager.resolve(&second).await.is_ok());
    assert!(!h.catalog.exists(&first).unwrap());
}

#[tokio::test]
async fn test_remove_cancels_pending_metadata_watch() {
    let h = TestHarness::new();
    let mut events = h.manager.subscribe();
    let hash = fixtures::hash(32);
    h.engine.register_delayed(
        hash,
        "Slow Metadata",
        fixtures::video_files(),
        Duration::from_millis(200),
    );

    let view = h
        .manager
        .add(TorrentInput::Hash(hash.to_hex()), TorrentDetails::default())
        .await
        .unwrap();
    assert!(view.loading_meta);
    let session = h.engine.session(&hash).unwrap();

    assert_eq!(h.manager.remove(&hash).await.unwrap(), RemoveOutcome::Removed);
    assert_eq!(session.closed_with(), Some(true));

    // Well past the point where metadata would have arrived
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert!(!h.catalog.exists(&hash).unwrap());
    assert!(h.manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reaper_evicts_idle_handles() {
    let h = TestHarness::build(
        false,
        TransferSettings {
            disconnect_timeout_secs: 0,
            ..Default::default()
        },
    );
    let hash = h.add_ready(19, "Idle").await;
    assert_eq!(h.manager.resident_count().await, 1);

    assert_eq!(h.manager.reap().await, 1);
    assert_eq!(h.manager.resident_count().await, 0);
    // Still in the catalog
    assert!(h.catalog.exists(&hash).unwrap());
}

#[tokio::test]
async fn test_restore_resolves_catalog_entries() {
    let h = TestHarness::new();
    let mut events = h.manager.subscribe();
    let hash = fixtures::hash(23);
    h.engine.register(hash, "Restored", fixtures::video_files());
    h.catalog
        .put(&swarmcast_core::TorrentRecord::provisional(
            swarmcast_core::TorrentSpec::from_hash(hash),
            1,
        ))
        .unwrap();

    assert_eq!(h.manager.restore().unwrap(), 1);

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no metadata event")
        .unwrap();
    assert_eq!(event.hash, hash);
    assert_eq!(event.title, "Restored");
}

#[tokio::test]
async fn test_shutdown_closes_sessions_without_deleting() {
    let h = TestHarness::new();
    let a = h.add_ready(24, "A").await;
    let b = h.add_ready(25, "B").await;

    h.manager.shutdown().await;

    let engine = h.engine.clone();
    wait_until("sessions closed", || engine.open_sessions() == 0).await;
    assert_eq!(h.engine.session(&a).unwrap().closed_with(), Some(false));
    assert_eq!(h.engine.session(&b).unwrap().closed_with(), Some(false));
    assert!(h.catalog.exists(&a).unwrap());
}
