//! Testing utilities and mock implementations.
//!
//! The mocks stand in for the swarm engine and the media player so the
//! lifecycle manager and the stream gateway can be exercised without
//! network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use swarmcast_core::testing::{fixtures, MockSwarmEngine};
//!
//! let engine = MockSwarmEngine::new();
//! engine.register(fixtures::hash(1), "Movie", fixtures::video_files());
//!
//! // Joining the swarm for that hash now yields metadata immediately;
//! // unregistered hashes never resolve.
//! ```

mod mock_player;
mod mock_swarm;

pub use mock_player::MockPlayer;
pub use mock_swarm::{pattern_byte, pattern_bytes, MockSwarmEngine, MockSwarmSession};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::swarm::SwarmFile;
    use crate::torrent::InfoHash;

    /// A deterministic hash filled with `n`.
    pub fn hash(n: u8) -> InfoHash {
        InfoHash::from_bytes([n; 20])
    }

    /// A magnet link for `hash` with a display name.
    pub fn magnet(hash: &InfoHash, name: &str) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&dn={}",
            hash.to_hex(),
            urlencoding::encode(name)
        )
    }

    /// A typical video release: one large video, subtitles and a sample.
    pub fn video_files() -> Vec<SwarmFile> {
        vec![
            SwarmFile {
                path: "Movie/movie.mkv".to_string(),
                length: 10 * 1024 * 1024,
            },
            SwarmFile {
                path: "Movie/Subs/english.srt".to_string(),
                length: 64 * 1024,
            },
            SwarmFile {
                path: "Movie/Sample/sample.mkv".to_string(),
                length: 1024 * 1024,
            },
        ]
    }
}
