//! Piece cache accounting and preload scheduling.

mod piece_cache;
mod preload;

pub use piece_cache::{CacheState, PieceCache};
pub use preload::{compute_preload_bytes, preload};
