//! Preload scheduling: fetch the head of a file before playback starts.

use tracing::debug;

use crate::swarm::{ByteRange, SwarmSession};

/// Bytes to preload for a cache of `capacity` bytes at `percent`.
///
/// Clamped to `[0, capacity]`. A non-positive percent yields 0.
pub fn compute_preload_bytes(capacity: u64, percent: i32) -> u64 {
    if percent <= 0 {
        return 0;
    }
    let bytes = (capacity as u128 * percent as u128) / 100;
    bytes.min(capacity as u128) as u64
}

/// Ask the engine to prioritize the first preload bytes of a file.
/// Returns the number of bytes requested (0 means nothing was scheduled).
pub fn preload(session: &dyn SwarmSession, file_index: usize, percent: i32) -> u64 {
    let bytes = compute_preload_bytes(session.cache().capacity(), percent);
    if bytes == 0 {
        debug!(hash = %session.info_hash(), "Preload disabled");
        return 0;
    }

    debug!(
        hash = %session.info_hash(),
        file_index,
        bytes,
        "Preloading file head"
    );
    session.prioritize(file_index, ByteRange::new(0, bytes));
    bytes
}
