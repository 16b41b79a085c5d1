//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Lifecycle (adds, removals, metadata resolution, resident handles)
//! - Stream gateway (sessions, bytes served, buffering gate)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Lifecycle Metrics
// =============================================================================

/// Torrents added by input kind.
pub static TORRENTS_ADDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("swarmcast_torrents_added_total", "Total torrents added"),
        &["kind"], // "magnet", "file", "hash"
    )
    .unwrap()
});

/// Torrents removed from the catalog.
pub static TORRENTS_REMOVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swarmcast_torrents_removed_total",
        "Total torrents removed",
    )
    .unwrap()
});

/// Background metadata resolutions by result.
pub static METADATA_RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "swarmcast_metadata_resolutions_total",
            "Background metadata resolutions",
        ),
        &["result"], // "ready", "timeout", "cancelled"
    )
    .unwrap()
});

/// Time from join to metadata ready, in seconds.
pub static METADATA_WAIT: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "swarmcast_metadata_wait_seconds",
            "Time until torrent metadata became available",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        &[],
    )
    .unwrap()
});

/// Handles currently resident in memory.
pub static HANDLES_RESIDENT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "swarmcast_handles_resident",
        "Torrent handles currently held in memory",
    )
    .unwrap()
});

/// Idle handles evicted by the reaper.
pub static HANDLES_EVICTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swarmcast_handles_evicted_total",
        "Idle torrent handles evicted from memory",
    )
    .unwrap()
});

// =============================================================================
// Stream Gateway Metrics
// =============================================================================

/// Stream sessions started.
pub static STREAM_SESSIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swarmcast_stream_sessions_total",
        "Total stream gateway sessions started",
    )
    .unwrap()
});

/// Stream sessions currently open (0 or 1).
pub static STREAM_SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "swarmcast_stream_sessions_active",
        "Stream gateway sessions currently open",
    )
    .unwrap()
});

/// Body bytes sent by the stream gateway.
pub static STREAM_BYTES_SERVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swarmcast_stream_bytes_served_total",
        "Bytes sent to stream consumers",
    )
    .unwrap()
});

/// Buffering gate wait by outcome.
pub static BUFFER_WAIT: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "swarmcast_buffer_wait_seconds",
            "Time spent in the pre-playback buffering gate",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0]),
        &["outcome"], // "filled", "timeout"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Lifecycle
        Box::new(TORRENTS_ADDED.clone()),
        Box::new(TORRENTS_REMOVED.clone()),
        Box::new(METADATA_RESOLUTIONS.clone()),
        Box::new(METADATA_WAIT.clone()),
        Box::new(HANDLES_RESIDENT.clone()),
        Box::new(HANDLES_EVICTED.clone()),
        // Stream gateway
        Box::new(STREAM_SESSIONS.clone()),
        Box::new(STREAM_SESSIONS_ACTIVE.clone()),
        Box::new(STREAM_BYTES_SERVED.clone()),
        Box::new(BUFFER_WAIT.clone()),
    ]
}
