//! Fill accounting for the active read window of a torrent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Point-in-time view of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheState {
    /// Contiguous bytes resident in the read window. Never exceeds `capacity`.
    pub filled: u64,
    /// Fixed capacity in bytes.
    pub capacity: u64,
}

impl CacheState {
    pub fn is_full(&self) -> bool {
        self.filled >= self.capacity
    }
}

/// File and position the window is tracking.
#[derive(Debug, Clone, Copy)]
struct Window {
    file_index: usize,
    cursor: u64,
}

/// A bounded, forward-streaming cache accountant.
///
/// The cache follows one file of interest at a time, starting with file 0.
/// Bytes arriving from the engine are counted only when they belong to that
/// file and extend the contiguous run starting at the window cursor; data
/// delivered out of order beyond the cursor is ignored until the gap is
/// filled by a later `record`. Within a window `filled` only grows until it
/// saturates at `capacity`. `begin_window` starts over on a new file.
///
/// `observe` is a lock-free load and can be polled from any task while the
/// download path keeps writing.
#[derive(Debug)]
pub struct PieceCache {
    capacity: u64,
    filled: AtomicU64,
    window: Mutex<Window>,
}

impl PieceCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            filled: AtomicU64::new(0),
            window: Mutex::new(Window {
                file_index: 0,
                cursor: 0,
            }),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// File the window is tracking.
    pub fn file_index(&self) -> usize {
        self.window().file_index
    }

    /// Current window cursor (end of the contiguous run).
    pub fn cursor(&self) -> u64 {
        self.window().cursor
    }

    /// Point the window at `file_index` starting from `offset` and drop the
    /// fill count of the previous window.
    pub fn begin_window(&self, file_index: usize, offset: u64) {
        let mut window = self.window();
        *window = Window {
            file_index,
            cursor: offset,
        };
        self.filled.store(0, Ordering::Release);
    }

    /// Account for `len` bytes of `file_index` delivered at `offset`.
    pub fn record(&self, file_index: usize, offset: u64, len: u64) {
        let end = offset.saturating_add(len);
        let mut window = self.window();
        if window.file_index != file_index || offset > window.cursor || end <= window.cursor {
            return;
        }
        let delta = end - window.cursor;
        window.cursor = end;
        self.add_filled(delta);
    }

    /// Move the window to a new read position in the same file (a seek).
    /// `filled` is kept.
    pub fn retarget(&self, offset: u64) {
        self.window().cursor = offset;
    }

    /// Wait-free snapshot.
    pub fn observe(&self) -> CacheState {
        CacheState {
            filled: self.filled.load(Ordering::Acquire),
            capacity: self.capacity,
        }
    }

    fn window(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_filled(&self, delta: u64) {
        let capacity = self.capacity;
        let _ = self
            .filled
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |filled| {
                Some(filled.saturating_add(delta).min(capacity))
            });
    }
}
